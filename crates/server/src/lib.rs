//! HTTP surface of sitesmith: intake, status, task history and live events.

pub mod error;
pub mod routes;
pub mod state;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sitesmith API",
        version = "0.1.0",
        description = "Turns briefs into static sites deployed to GitHub Pages"
    ),
    paths(
        routes::service_info,
        routes::health_check,
        routes::submit_request,
        routes::get_status,
        routes::list_tasks,
        routes::get_task,
        routes::get_task_phases,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::ServiceInfo,
        routes::AcceptedResponse,
        routes::TaskStatusResponse,
        routes::PhasesResponse,
        error::ErrorResponse,
        sitesmith_core::Task,
        sitesmith_core::TaskStatus,
        sitesmith_core::TaskPhase,
        sitesmith_core::TaskSubmission,
        sitesmith_core::Attachment,
        sitesmith_core::PhaseRecord,
        events::EventEnvelope,
        events::Event,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "requests", description = "Brief intake and round status"),
        (name = "tasks", description = "Task history"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.cors_origins());

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/", get(routes::service_info))
        .route("/health", get(routes::health_check))
        .route("/api/health", get(routes::health_check))
        .route("/api/request", post(routes::submit_request))
        .route("/api/status/{task}", get(routes::get_status))
        .route("/api/tasks", get(routes::list_tasks))
        .route("/api/tasks/{id}", get(routes::get_task))
        .route("/api/tasks/{id}/phases", get(routes::get_task_phases))
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

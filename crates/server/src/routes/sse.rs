use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Comma-separated task IDs to filter events
    pub task_ids: Option<String>,
}

fn parse_task_ids(task_ids: Option<&str>) -> Option<Vec<Uuid>> {
    task_ids.map(|s| {
        s.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
}

/// Events without a task (errors) pass every filter.
fn matches_filter(envelope: &events::EventEnvelope, task_ids: Option<&[Uuid]>) -> bool {
    match (task_ids, envelope.event.task_id()) {
        (Some(ids), Some(task_id)) => ids.contains(&task_id),
        _ => true,
    }
}

fn envelope_to_sse_event(envelope: &events::EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(envelope.event.name())
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_ids = parse_task_ids(query.task_ids.as_deref());
    let last_event_id = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    // subscribe before reading history so nothing falls between the two
    let rx = state.event_bus.subscribe();
    let missed_events: Vec<_> = last_event_id
        .map(|id| state.event_bus.events_after(id))
        .unwrap_or_default()
        .into_iter()
        .filter(|e| matches_filter(e, task_ids.as_deref()))
        .collect();
    let replayed: HashSet<Uuid> = missed_events.iter().map(|e| e.id).collect();

    let missed_stream =
        futures::stream::iter(missed_events.into_iter().map(|e| envelope_to_sse_event(&e)));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        let item = match result {
            // live copies of events already sent from history are dropped
            Ok(envelope)
                if !replayed.contains(&envelope.id)
                    && matches_filter(&envelope, task_ids.as_deref()) =>
            {
                Some(envelope_to_sse_event(&envelope))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("SSE broadcast error: {:?}", e);
                None
            }
        };
        futures::future::ready(item)
    });

    let stream = missed_stream.chain(live_stream);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

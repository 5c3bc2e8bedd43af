use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use github::{Deployment, PagesDeployer, RepoTarget, SiteFile};
use llm::{ChatProvider, FailoverClient, GenerationRequest, OutputKind, ProviderError};
use orchestrator::{AgentConfig, ExecutorContext, LintReport, Linter, TaskExecutor, TaskRunner};
use serde_json::{json, Value};
use server::{create_router, state::AppState};
use tempfile::TempDir;

struct InstantLlm;

#[async_trait]
impl ChatProvider for InstantLlm {
    fn name(&self) -> &str {
        "instant"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        Ok(match request.kind {
            OutputKind::Analysis => r#"{"technologies":["HTML"],"complexity":"low"}"#.to_string(),
            OutputKind::Plan => r#"{"steps":[{"step":1,"action":"Write the page"}]}"#.to_string(),
            OutputKind::Site => {
                "```index.html\n<html><head><title>Hi</title></head><body></body></html>\n```"
                    .to_string()
            }
            OutputKind::Readme => "A one-page site.".to_string(),
        })
    }
}

struct PassingLinter;

#[async_trait]
impl Linter for PassingLinter {
    fn name(&self) -> &str {
        "passing"
    }

    async fn check(&self, _workspace: &std::path::Path) -> orchestrator::Result<LintReport> {
        Ok(LintReport::passed())
    }
}

struct RecordingDeployer;

#[async_trait]
impl PagesDeployer for RecordingDeployer {
    async fn resolve_target(&self, repo_name: &str) -> github::Result<RepoTarget> {
        Ok(RepoTarget::new("octo", repo_name))
    }

    async fn deploy(
        &self,
        target: &RepoTarget,
        _files: &[SiteFile],
        _message: &str,
    ) -> github::Result<Deployment> {
        Ok(Deployment {
            repo_url: target.repo_url(),
            pages_url: target.pages_url(),
            commit_sha: "abc123".to_string(),
        })
    }

    async fn fetch_files(
        &self,
        _target: &RepoTarget,
        _paths: &[&str],
    ) -> github::Result<Vec<SiteFile>> {
        Ok(Vec::new())
    }
}

async fn setup_with_secret(secret: Option<&str>) -> (TestServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());

    let pool = db::create_pool(&db_url).await.expect("Failed to create pool");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let task_repository = db::TaskRepository::new(pool);
    let event_bus = events::EventBus::new();
    let config = AgentConfig::default().with_workspace_root(temp_dir.path().join("workspaces"));
    let ctx = ExecutorContext::new(
        config,
        FailoverClient::new(vec![Arc::new(InstantLlm)]),
        Arc::new(RecordingDeployer),
        task_repository.clone(),
    )
    .with_linter(Arc::new(PassingLinter))
    .with_event_bus(event_bus.clone());
    let runner = TaskRunner::new(TaskExecutor::new(ctx));

    let state = AppState::new(task_repository, event_bus, runner).with_shared_secret(secret);
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");

    (server, temp_dir)
}

async fn setup_test_server() -> (TestServer, TempDir) {
    setup_with_secret(None).await
}

fn submission(task: &str, round: u32, nonce: &str) -> Value {
    json!({
        "email": "student@example.com",
        "secret": "letmein",
        "task": task,
        "round": round,
        "nonce": nonce,
        "brief": "A page that says hi",
        "checks": ["Page has a title"],
        "attachments": []
    })
}

async fn wait_for_terminal(server: &TestServer, task: &str) -> Value {
    for _ in 0..100 {
        let body: Value = server.get(&format!("/api/status/{}", task)).await.json();
        if body["status"] == "succeeded" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} did not finish", task);
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _temp_dir) = setup_test_server().await;

        for path in ["/health", "/api/health"] {
            let response = server.get(path).await;
            response.assert_status_ok();
            let body: Value = response.json();
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn test_service_info() {
        let (server, _temp_dir) = setup_test_server().await;

        let body: Value = server.get("/").await.json();
        assert_eq!(body["service"], "sitesmith");
        assert!(body["endpoints"]
            .as_array()
            .unwrap()
            .contains(&json!("POST /api/request")));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (server, _temp_dir) = setup_test_server().await;

        let body: Value = server.get("/api/openapi.json").await.json();
        assert!(body["paths"]["/api/request"]["post"].is_object());
        assert!(body["paths"]["/api/status/{task}"]["get"].is_object());
    }
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn test_submission_is_accepted_and_deployed() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/request")
            .json(&submission("Hello_World", 1, "nonce-1"))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["task"], "Hello_World");
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["nonce"], "nonce-1");
        assert_eq!(body["estimated_completion_time_minutes"], 5);
        assert!(body["task_id"].is_string());

        let status = wait_for_terminal(&server, "Hello_World").await;
        assert_eq!(status["status"], "succeeded");
        assert_eq!(status["round"], 1);
        assert_eq!(status["phase"], "review");
        assert_eq!(status["act_attempts"], 1);
        assert_eq!(status["repo_url"], "https://github.com/octo/hello-world");
        assert_eq!(status["pages_url"], "https://octo.github.io/hello-world/");
        assert_eq!(status["commit_sha"], "abc123");
        assert!(status["error"].is_null());
    }

    #[tokio::test]
    async fn test_duplicate_nonce_is_conflict() {
        let (server, _temp_dir) = setup_test_server().await;

        server
            .post("/api/request")
            .json(&submission("dup", 1, "same-nonce"))
            .await
            .assert_status_ok();

        let response = server
            .post("/api/request")
            .json(&submission("dup", 2, "same-nonce"))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_invalid_submission_is_bad_request() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/request")
            .json(&submission("zero-round", 0, "n-0"))
            .await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().unwrap().contains("round"));
    }

    #[tokio::test]
    async fn test_secret_is_enforced_when_configured() {
        let (server, _temp_dir) = setup_with_secret(Some("correct-horse")).await;

        let response = server
            .post("/api/request")
            .json(&submission("guarded", 1, "n-wrong"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let mut body = submission("guarded", 1, "n-right");
        body["secret"] = json!("correct-horse");
        server.post("/api/request").json(&body).await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_unknown_task_status_is_not_found() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.get("/api/status/never-submitted").await;

        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_status_reports_latest_round() {
        let (server, _temp_dir) = setup_test_server().await;

        server
            .post("/api/request")
            .json(&submission("rounds", 1, "r-1"))
            .await
            .assert_status_ok();
        wait_for_terminal(&server, "rounds").await;

        server
            .post("/api/request")
            .json(&submission("rounds", 2, "r-2"))
            .await
            .assert_status_ok();
        let status = wait_for_terminal(&server, "rounds").await;

        assert_eq!(status["round"], 2);
        assert_eq!(status["status"], "succeeded");
        assert_eq!(status["repo_url"], "https://github.com/octo/rounds");
    }
}

mod tasks {
    use super::*;

    #[tokio::test]
    async fn test_list_tasks_and_phase_history() {
        let (server, _temp_dir) = setup_test_server().await;

        let accepted: Value = server
            .post("/api/request")
            .json(&submission("listed", 1, "l-1"))
            .await
            .json();
        wait_for_terminal(&server, "listed").await;

        let response = server.get("/api/tasks").await;
        response.assert_status_ok();
        let tasks: Value = response.json();
        assert_eq!(tasks.as_array().unwrap().len(), 1);
        assert_eq!(tasks[0]["task"], "listed");

        let task_id = accepted["task_id"].as_str().unwrap();
        let phases: Value = server
            .get(&format!("/api/tasks/{}/phases", task_id))
            .await
            .json();
        let names: Vec<&str> = phases["phases"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["phase"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["think", "plan", "act", "review"]);
    }

    #[tokio::test]
    async fn test_get_task_not_found() {
        let (server, _temp_dir) = setup_test_server().await;

        let fake_id = uuid::Uuid::new_v4();
        server
            .get(&format!("/api/tasks/{}", fake_id))
            .await
            .assert_status_not_found();
        server
            .get(&format!("/api/tasks/{}/phases", fake_id))
            .await
            .assert_status_not_found();
    }
}

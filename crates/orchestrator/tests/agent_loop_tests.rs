use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use db::{create_pool, run_migrations, TaskRepository};
use events::{Event, EventBus};
use github::{Deployment, GitHubError, PagesDeployer, RepoTarget, SiteFile};
use llm::{ChatProvider, FailoverClient, GenerationRequest, OutputKind, ProviderError};
use orchestrator::{
    AgentConfig, CallbackClient, CallbackPolicy, ExecutorContext, LintReport, Linter,
    TaskExecutor, TaskRunner,
};
use serde_json::json;
use sitesmith_core::{Attachment, Task, TaskPhase, TaskStatus};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYSIS: &str = r#"{"technologies":["HTML","CSS"],"complexity":"low","key_components":["counter"]}"#;
const PLAN: &str = r#"{"steps":[{"step":1,"action":"Write markup"},{"step":2,"action":"Wire button"}]}"#;

fn site_response(marker: &str) -> String {
    format!(
        "```index.html\n<html><head><title>{marker}</title></head><body><button id=\"inc\">+</button></body></html>\n```\n\n```style.css\nbody {{ margin: 0; }}\n```\n\n```script.js\nconsole.log('{marker}');\n```"
    )
}

/// LLM fake answering by output kind and recording every Site prompt.
struct ScriptedLlm {
    sites: Mutex<VecDeque<String>>,
    site_prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedLlm {
    fn new(sites: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sites: Mutex::new(sites.iter().map(|s| s.to_string()).collect()),
            site_prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(sites: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sites: Mutex::new(sites.iter().map(|s| s.to_string()).collect()),
            site_prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn site_calls(&self) -> usize {
        self.site_prompts.lock().unwrap().len()
    }

    fn site_prompt(&self, index: usize) -> String {
        self.site_prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(match request.kind {
            OutputKind::Analysis => ANALYSIS.to_string(),
            OutputKind::Plan => PLAN.to_string(),
            OutputKind::Readme => "A small counter page.".to_string(),
            OutputKind::Site => {
                self.site_prompts
                    .lock()
                    .unwrap()
                    .push(request.prompt.clone());
                let mut sites = self.sites.lock().unwrap();
                if sites.len() > 1 {
                    sites.pop_front().unwrap_or_default()
                } else {
                    sites.front().cloned().unwrap_or_else(|| site_response("default"))
                }
            }
        })
    }
}

struct DownProvider;

#[async_trait]
impl ChatProvider for DownProvider {
    fn name(&self) -> &str {
        "down"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

/// Linter fake returning scripted verdicts, then passing.
struct ScriptedLinter {
    verdicts: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
}

impl ScriptedLinter {
    fn new(verdicts: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Linter for ScriptedLinter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn check(&self, workspace: &Path) -> orchestrator::Result<LintReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(workspace.join("index.html").exists());
        let passed = self.verdicts.lock().unwrap().pop_front().unwrap_or(true);
        Ok(if passed {
            LintReport::passed()
        } else {
            LintReport::failed(format!("index.html:1 unclosed <div> (run {})", call))
        })
    }
}

#[derive(Debug, Clone)]
struct DeployCall {
    target: RepoTarget,
    files: Vec<SiteFile>,
    message: String,
}

#[derive(Default)]
struct FakeDeployer {
    deploys: Mutex<Vec<DeployCall>>,
    existing: Mutex<Vec<SiteFile>>,
    fail_with: Option<u16>,
}

impl FakeDeployer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(status),
            ..Self::default()
        })
    }

    fn with_existing(files: Vec<SiteFile>) -> Arc<Self> {
        Arc::new(Self {
            existing: Mutex::new(files),
            ..Self::default()
        })
    }

    fn deploys(&self) -> Vec<DeployCall> {
        self.deploys.lock().unwrap().clone()
    }
}

#[async_trait]
impl PagesDeployer for FakeDeployer {
    async fn resolve_target(&self, repo_name: &str) -> github::Result<RepoTarget> {
        Ok(RepoTarget::new("octo", repo_name))
    }

    async fn deploy(
        &self,
        target: &RepoTarget,
        files: &[SiteFile],
        message: &str,
    ) -> github::Result<Deployment> {
        if let Some(status) = self.fail_with {
            return Err(GitHubError::Api {
                status,
                message: "Repository creation failed".to_string(),
            });
        }
        let mut deploys = self.deploys.lock().unwrap();
        deploys.push(DeployCall {
            target: target.clone(),
            files: files.to_vec(),
            message: message.to_string(),
        });
        Ok(Deployment {
            repo_url: target.repo_url(),
            pages_url: target.pages_url(),
            commit_sha: format!("sha-{}", deploys.len()),
        })
    }

    async fn fetch_files(
        &self,
        _target: &RepoTarget,
        paths: &[&str],
    ) -> github::Result<Vec<SiteFile>> {
        Ok(self
            .existing
            .lock()
            .unwrap()
            .iter()
            .filter(|f| paths.contains(&f.path.as_str()))
            .cloned()
            .collect())
    }
}

struct Harness {
    dir: TempDir,
    repo: TaskRepository,
    bus: EventBus,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("tasks.db").display());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Self {
            dir,
            repo: TaskRepository::new(pool),
            bus: EventBus::new(),
        }
    }

    fn executor(
        &self,
        llm: Vec<Arc<dyn ChatProvider>>,
        linter: Arc<dyn Linter>,
        deployer: Arc<dyn PagesDeployer>,
        config: AgentConfig,
    ) -> TaskExecutor {
        let ctx = ExecutorContext::new(
            config.with_workspace_root(self.dir.path().join("workspaces")),
            FailoverClient::new(llm),
            deployer,
            self.repo.clone(),
        )
        .with_linter(linter)
        .with_event_bus(self.bus.clone());
        TaskExecutor::new(ctx)
    }

    async fn submit(&self, task: Task) -> Task {
        self.repo.create(&task).await.unwrap()
    }

    async fn phases(&self, task: &Task) -> Vec<TaskPhase> {
        self.repo
            .phase_history(task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.phase)
            .collect()
    }
}

fn counter_task(name: &str) -> Task {
    Task::new(name, 1, "A page with a button #inc that increments a counter")
        .with_checks(vec!["Has #inc".to_string(), "Repo has MIT license".to_string()])
}

#[tokio::test]
async fn test_round_one_runs_every_phase_and_succeeds() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Counter")]);
    let linter = ScriptedLinter::new(&[]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        linter.clone(),
        deployer.clone(),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("Counter_App")).await;
    let mut events = harness.bus.subscribe();

    let outcome = executor.run(task.clone()).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(
        harness.phases(&task).await,
        vec![TaskPhase::Think, TaskPhase::Plan, TaskPhase::Act, TaskPhase::Review]
    );
    assert_eq!(llm.site_calls(), 1);
    assert_eq!(linter.calls.load(Ordering::SeqCst), 1);

    let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Succeeded);
    assert_eq!(stored.act_attempts, 1);
    assert_eq!(stored.repo_url.as_deref(), Some("https://github.com/octo/counter-app"));
    assert_eq!(stored.pages_url.as_deref(), Some("https://octo.github.io/counter-app/"));
    assert_eq!(stored.commit_sha.as_deref(), Some("sha-1"));
    assert!(stored.completed_at.is_some());

    let deploys = deployer.deploys();
    assert_eq!(deploys.len(), 1);
    let paths: Vec<_> = deploys[0].files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["LICENSE", "index.html", "script.js", "style.css", "README.md"]
    );
    assert!(deploys[0].message.starts_with("Initial deployment: "));
    let readme = deploys[0].files.last().unwrap().text();
    assert!(readme.contains("A small counter page."));
    assert!(readme.contains("- [x] Has #inc"));

    let checks = outcome.checks.unwrap();
    assert_eq!(checks.summary(), "2 passed, 0 failed, 0 unverified");

    let mut names = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        names.push(envelope.event.name());
    }
    assert_eq!(names.first(), Some(&"task.phase_changed"));
    assert!(names.contains(&"task.deployed"));
    assert_eq!(names.last(), Some(&"task.completed"));
}

#[tokio::test]
async fn test_single_lint_failure_is_fixed_by_one_regeneration() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Broken"), &site_response("Fixed")]);
    let linter = ScriptedLinter::new(&[false, true]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        linter.clone(),
        deployer.clone(),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("retry-once")).await;

    let outcome = executor.run(task.clone()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Succeeded);
    assert_eq!(llm.site_calls(), 2);
    assert_eq!(outcome.task.act_attempts, 2);
    assert!(llm.site_prompt(1).contains("index.html:1 unclosed <div> (run 1)"));
    assert!(llm.site_prompt(1).contains("Broken"));

    assert_eq!(
        harness.phases(&task).await,
        vec![
            TaskPhase::Think,
            TaskPhase::Plan,
            TaskPhase::Act,
            TaskPhase::Review,
            TaskPhase::Act,
            TaskPhase::Review
        ]
    );

    let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.act_attempts, 2);
    let html = deployer.deploys()[0]
        .files
        .iter()
        .find(|f| f.path == "index.html")
        .unwrap()
        .text();
    assert!(html.contains("<title>Fixed</title>"));
}

#[tokio::test]
async fn test_second_lint_failure_fails_the_task() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Broken")]);
    let linter = ScriptedLinter::new(&[false, false]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        linter.clone(),
        deployer.clone(),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("retry-twice")).await;
    let mut events = harness.bus.subscribe();

    let outcome = executor.run(task.clone()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert_eq!(llm.site_calls(), 2);
    assert!(deployer.deploys().is_empty());

    let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.phase, Some(TaskPhase::Review));
    let message = stored.error_message.unwrap();
    assert!(message.contains("Lint failed after 2 attempt(s)"), "{}", message);
    assert!(message.contains("(run 2)"));

    let mut lint_failures = 0;
    while let Ok(envelope) = events.try_recv() {
        if let Event::LintFailed { .. } = envelope.event {
            lint_failures += 1;
        }
    }
    assert_eq!(lint_failures, 2);
}

#[tokio::test]
async fn test_response_without_index_html_counts_as_act_failure() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&["I'm sorry, I can only describe the page.", &site_response("Ok")]);
    let linter = ScriptedLinter::new(&[]);
    let executor = harness.executor(
        vec![llm.clone()],
        linter.clone(),
        FakeDeployer::new(),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("no-index")).await;

    let outcome = executor.run(task).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(llm.site_calls(), 2);
    assert!(llm.site_prompt(1).contains("did not contain an index.html"));
    // the linter only sees the attempt that produced a page
    assert_eq!(linter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_provider_exhaustion_fails_the_task() {
    let harness = Harness::new().await;
    let executor = harness.executor(
        vec![Arc::new(DownProvider), Arc::new(DownProvider)],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("no-llm")).await;

    let outcome = executor.run(task.clone()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    let error = outcome.error.unwrap();
    assert!(error.contains("All 2 providers failed"), "{}", error);
    assert_eq!(harness.phases(&task).await, vec![TaskPhase::Think]);
}

#[tokio::test]
async fn test_deployment_error_fails_the_task_without_retry() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Counter")]);
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        FakeDeployer::failing(422),
        AgentConfig::default(),
    );
    let task = harness.submit(counter_task("deploy-fails")).await;

    let outcome = executor.run(task.clone()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert_eq!(llm.site_calls(), 1);
    let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert!(stored
        .error_message
        .unwrap()
        .contains("Repository creation failed"));
}

#[tokio::test]
async fn test_update_round_reuses_previous_repository_and_files() {
    let harness = Harness::new().await;

    let mut first = counter_task("weather");
    first.status = TaskStatus::Succeeded;
    let first = harness.submit(first).await;
    harness
        .repo
        .mark_succeeded(
            first.id,
            "https://github.com/octo-org/weather",
            "https://octo-org.github.io/weather/",
            "old",
        )
        .await
        .unwrap();

    let llm = ScriptedLlm::new(&["```index.html\n<html><head><title>v2</title></head><body></body></html>\n```"]);
    let deployer = FakeDeployer::with_existing(vec![
        SiteFile::new("index.html", "<p>version one</p>"),
        SiteFile::new("script.js", "console.log('kept');"),
    ]);
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        deployer.clone(),
        AgentConfig::default(),
    );
    let mut second = Task::new("weather", 2, "Add a dark mode toggle");
    second.email = "student@example.com".to_string();
    let second = harness.submit(second).await;

    let outcome = executor.run(second).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(llm.site_prompt(0).contains("<p>version one</p>"));

    let deploy = &deployer.deploys()[0];
    assert_eq!(deploy.target, RepoTarget::new("octo-org", "weather"));
    assert!(deploy.message.starts_with("Round 2 update: Add a dark mode toggle"));
    let script = deploy.files.iter().find(|f| f.path == "script.js").unwrap();
    assert_eq!(script.text(), "console.log('kept');");
    let license = deploy.files.iter().find(|f| f.path == "LICENSE").unwrap();
    assert!(license.text().contains("octo-org"));
}

#[tokio::test]
async fn test_update_round_without_history_starts_fresh() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Fresh")]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        deployer.clone(),
        AgentConfig::default(),
    );
    let task = harness.submit(Task::new("orphan", 2, "Change the colours")).await;

    let outcome = executor.run(task).await.unwrap();

    assert!(outcome.is_success());
    assert!(!llm.site_prompt(0).contains("## Current version"));
    assert_eq!(deployer.deploys()[0].target, RepoTarget::new("octo", "orphan"));
}

#[tokio::test]
async fn test_attachments_are_written_and_deployed() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Sales")]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        deployer.clone(),
        AgentConfig::default(),
    );
    let mut task = counter_task("sales");
    task.attachments = vec![Attachment::new("data.csv", "data:text/csv;base64,c2FsZXMKMTAK")];
    let task = harness.submit(task).await;

    executor.run(task).await.unwrap();

    assert!(llm.site_prompt(0).contains("`data.csv` (starts with: \"sales\\n10\\n\")"));
    let csv = deployer.deploys()[0]
        .files
        .iter()
        .find(|f| f.path == "data.csv")
        .cloned()
        .unwrap();
    assert_eq!(csv.text(), "sales\n10\n");
}

#[tokio::test]
async fn test_attachment_names_with_unsafe_characters_are_sanitized() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::new(&[&site_response("Notes")]);
    let deployer = FakeDeployer::new();
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        deployer.clone(),
        AgentConfig::default(),
    );
    let mut task = counter_task("notes");
    task.attachments = vec![
        Attachment::new("notes:v1.txt", "data:text/plain;base64,aGk="),
        Attachment::new("..", "data:text/plain;base64,aGk="),
    ];
    let task = harness.submit(task).await;

    let outcome = executor.run(task).await.unwrap();

    assert!(outcome.is_success(), "error: {:?}", outcome.error);
    assert_eq!(llm.site_calls(), 1);
    let paths: Vec<String> = deployer.deploys()[0]
        .files
        .iter()
        .map(|f| f.path.clone())
        .collect();
    assert!(paths.contains(&"notes-v1.txt".to_string()));
    assert!(paths.contains(&"attachment".to_string()));
}

#[tokio::test]
async fn test_callback_reports_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eval"))
        .and(body_partial_json(json!({
            "task": "cb-ok",
            "round": 1,
            "repo_url": "https://github.com/octo/cb-ok",
            "commit_sha": "sha-1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/eval"))
        .and(body_partial_json(json!({"task": "cb-fail", "status": "failed"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let harness = Harness::new().await;
    let policy = CallbackPolicy::default()
        .with_max_attempts(2)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(10));
    let ctx_config = AgentConfig::default().with_callback_policy(policy.clone());

    let ok = harness.executor(
        vec![ScriptedLlm::new(&[&site_response("Ok")])],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        ctx_config.clone(),
    );
    let ok_task = harness
        .submit(counter_task("cb-ok").with_evaluation_url(format!("{}/eval", server.uri())))
        .await;
    assert!(ok.run(ok_task).await.unwrap().is_success());

    let failing = TaskExecutor::new(
        ExecutorContext::new(
            ctx_config,
            FailoverClient::new(vec![Arc::new(DownProvider)]),
            FakeDeployer::new(),
            harness.repo.clone(),
        )
        .with_event_bus(harness.bus.clone())
        .with_callback_client(CallbackClient::new(policy)),
    );
    let fail_task = harness
        .submit(counter_task("cb-fail").with_evaluation_url(format!("{}/eval", server.uri())))
        .await;
    let mut events = harness.bus.subscribe();
    let outcome = failing.run(fail_task.clone()).await.unwrap();

    // undeliverable callback leaves the recorded status alone
    assert_eq!(outcome.status(), TaskStatus::Failed);
    let stored = harness.repo.find_by_id(fail_task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);

    let mut callback_failed = false;
    while let Ok(envelope) = events.try_recv() {
        if let Event::CallbackFailed { task_id, .. } = envelope.event {
            callback_failed = task_id == fail_task.id;
        }
    }
    assert!(callback_failed);
}

#[tokio::test]
async fn test_concurrent_tasks_keep_monotonic_phase_histories() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::slow(&[&site_response("Concurrent")], Duration::from_millis(20));
    let executor = harness.executor(
        vec![llm.clone()],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        AgentConfig::default().with_max_concurrent_tasks(3),
    );
    let runner = TaskRunner::new(executor);

    let a = harness.submit(counter_task("alpha")).await;
    let b = harness.submit(counter_task("beta")).await;
    let handles = vec![runner.submit(a.clone()), runner.submit(b.clone())];
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.error);
    }

    for task in [&a, &b] {
        assert_eq!(
            harness.phases(task).await,
            vec![TaskPhase::Think, TaskPhase::Plan, TaskPhase::Act, TaskPhase::Review]
        );
        let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Succeeded);
    }
}

#[tokio::test]
async fn test_runner_times_out_slow_tasks() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::slow(&[&site_response("Slow")], Duration::from_secs(5));
    let executor = harness.executor(
        vec![llm],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        AgentConfig::default().with_task_timeout(Duration::from_millis(100)),
    );
    let runner = TaskRunner::new(executor);
    let task = harness.submit(counter_task("slowpoke")).await;

    let outcome = runner.submit(task.clone()).await.unwrap().unwrap();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Task timed out after 1 minutes")
    );
}

#[tokio::test]
async fn test_runner_limits_concurrency() {
    let harness = Harness::new().await;
    let llm = ScriptedLlm::slow(&[&site_response("Queued")], Duration::from_millis(30));
    let executor = harness.executor(
        vec![llm],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        AgentConfig::default().with_max_concurrent_tasks(1),
    );
    let runner = TaskRunner::new(executor);
    assert_eq!(runner.available_slots(), 1);

    let first = harness.submit(counter_task("first")).await;
    let second = harness.submit(counter_task("second")).await;
    let first_handle = runner.submit(first.clone());
    let second_handle = runner.submit(second.clone());

    tokio::time::sleep(Duration::from_millis(40)).await;
    let waiting = harness.repo.find_by_id(second.id).await.unwrap().unwrap();
    let running = harness.repo.find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(running.status, TaskStatus::Running);
    assert_eq!(waiting.status, TaskStatus::Queued);

    first_handle.await.unwrap().unwrap();
    second_handle.await.unwrap().unwrap();
    let done = harness.repo.find_by_id(second.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn test_restart_fails_unfinished_tasks_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eval"))
        .and(body_partial_json(json!({"task": "orphaned", "status": "failed"})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = Harness::new().await;
    let queued = harness
        .submit(counter_task("orphaned").with_evaluation_url(format!("{}/eval", server.uri())))
        .await;
    let running = harness.submit(counter_task("mid-flight")).await;
    harness.repo.mark_running(running.id).await.unwrap();
    harness.repo.record_phase(running.id, TaskPhase::Act).await.unwrap();

    let executor = harness.executor(
        vec![ScriptedLlm::new(&[&site_response("Unused")])],
        ScriptedLinter::new(&[]),
        FakeDeployer::new(),
        AgentConfig::default(),
    );
    let runner = TaskRunner::new(executor);
    let mut events = harness.bus.subscribe();

    assert_eq!(runner.recover_interrupted().await.unwrap(), 2);

    for task in [&queued, &running] {
        let stored = harness.repo.find_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Task was interrupted by a service restart before it finished")
        );
    }

    let mut completed = 0;
    while let Ok(envelope) = events.try_recv() {
        if matches!(envelope.event, Event::TaskCompleted { .. }) {
            completed += 1;
        }
    }
    assert_eq!(completed, 2);

    let mut delivered = false;
    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered);

    assert_eq!(runner.recover_interrupted().await.unwrap(), 0);
}

mod settings;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use github::GitHubClient;
use llm::{FailoverClient, ProviderKind};
use orchestrator::{ExecutorContext, TaskExecutor, TaskRunner};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use settings::{sqlite_file_path, Overrides, Settings};

const DEFAULT_LOG_FILTER: &str = "sitesmith=info,server=info,orchestrator=info,tower_http=info";

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(about = "Builds static sites from briefs and deploys them to GitHub Pages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// Show the LLM providers in failover order
    Providers,
    /// Show the latest round of a task
    Status {
        /// Caller-supplied task identifier
        task: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // before settings, which log skipped providers while resolving
    init_tracing();
    let settings = Settings::load(&cli.overrides)?;

    match cli.command {
        None | Some(Commands::Serve) => serve(settings).await,
        Some(Commands::Providers) => providers(&settings),
        Some(Commands::Status { task }) => status(&settings, &task).await,
    }
}

async fn connect(settings: &Settings) -> Result<db::TaskRepository> {
    if let Some(path) = sqlite_file_path(&settings.database_url) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let pool = db::create_pool(&settings.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;
    Ok(db::TaskRepository::new(pool))
}

async fn serve(settings: Settings) -> Result<()> {
    if settings.providers.is_empty() {
        let variables: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.api_key_env()).collect();
        bail!(
            "No LLM providers configured. Set at least one of {}",
            variables.join(", ")
        );
    }
    let Some(token) = settings.github_token.as_deref() else {
        bail!("GITHUB_TOKEN is required to deploy sites");
    };

    let task_repository = connect(&settings).await?;
    tracing::info!(database = %settings.database_url, "Database ready");

    let mut github = GitHubClient::new(token)?;
    if let Some(owner) = &settings.github_owner {
        github = github.with_owner(owner.clone());
    }

    let llm = FailoverClient::from_settings(&settings.providers)
        .context("Failed to build LLM clients")?;
    tracing::info!(providers = ?llm.provider_names(), "LLM providers configured");

    let event_bus = events::EventBus::new();
    let ctx = ExecutorContext::new(
        settings.agent_config(),
        llm,
        Arc::new(github),
        task_repository.clone(),
    )
    .with_event_bus(event_bus.clone());
    tracing::info!(linter = ctx.linter.name(), "Linter selected");
    let runner = TaskRunner::new(TaskExecutor::new(ctx));
    runner
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted tasks")?;

    let state = AppState::new(task_repository, event_bus, runner)
        .with_shared_secret(settings.shared_secret.as_deref())
        .with_cors_origins(settings.cors_origins.clone());
    if !state.requires_secret() {
        tracing::warn!("No SHARED_SECRET configured, submissions are not authenticated");
    }
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address()).await?;
    let port = listener.local_addr()?.port();

    println!();
    println!("sitesmith");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!("  Concurrency: {} task(s)", settings.max_concurrent_tasks);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn providers(settings: &Settings) -> Result<()> {
    let providers = settings.providers.providers();
    if providers.is_empty() {
        println!("No LLM providers configured.");
        return Ok(());
    }

    println!("Providers in failover order:");
    for (index, provider) in providers.iter().enumerate() {
        println!(
            "  {}. {:<12} {:<40} {}  {}",
            index + 1,
            provider.kind.as_str(),
            provider.model,
            provider.masked_key(),
            provider.base_url()
        );
    }
    println!();
    println!(
        "Request timeout: {}s",
        settings.providers.request_timeout().as_secs()
    );
    Ok(())
}

async fn status(settings: &Settings, task: &str) -> Result<()> {
    let repo = connect(settings).await?;

    let Some(latest) = repo.find_latest_by_task(task).await? else {
        println!("No task named '{}'.", task);
        return Ok(());
    };

    println!();
    println!("Task:     {} (round {})", latest.task, latest.round);
    println!("Status:   {}", latest.status.as_str());
    println!(
        "Phase:    {}",
        latest.phase.map(|p| p.as_str()).unwrap_or("-")
    );
    println!("Attempts: {}", latest.act_attempts);
    if let Some(repo_url) = &latest.repo_url {
        println!("Repo:     {}", repo_url);
    }
    if let Some(pages_url) = &latest.pages_url {
        println!("Pages:    {}", pages_url);
    }
    if let Some(sha) = &latest.commit_sha {
        println!("Commit:   {}", sha);
    }
    if let Some(error) = &latest.error_message {
        println!("Error:    {}", error);
    }

    let phases = repo.phase_history(latest.id).await?;
    if !phases.is_empty() {
        let trail: Vec<&str> = phases.iter().map(|p| p.phase.as_str()).collect();
        println!("History:  {}", trail.join(" → "));
    }
    println!();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// `RUST_LOG`, else `LOG_LEVEL`, else the default filter. `LOG_FORMAT=json`
/// switches to JSON lines. Logs go to stderr so command output stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

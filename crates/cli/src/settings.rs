use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use llm::{ProviderConfig, ProviderKind, ProviderSettings};
use orchestrator::{AgentConfig, LinterConfig};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "sitesmith.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/sitesmith.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;
const DEFAULT_TASK_TIMEOUT_MINUTES: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 180;

/// Command-line and environment overrides. Each wins over `sitesmith.toml`.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Path to the TOML settings file; a missing file is ignored
    #[arg(long, global = true, env = "SITESMITH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, global = true, env = "API_HOST")]
    pub host: Option<String>,

    #[arg(long, global = true, env = "API_PORT")]
    pub port: Option<u16>,

    /// Provider priority, e.g. `groq,openai,anthropic`
    #[arg(long, global = true, env = "PROVIDER_ORDER", value_delimiter = ',')]
    pub provider_order: Option<Vec<String>>,

    #[arg(long, global = true, env = "MAX_CONCURRENT_TASKS")]
    pub max_concurrent_tasks: Option<usize>,

    #[arg(long, global = true, env = "TASK_TIMEOUT_MINUTES")]
    pub task_timeout_minutes: Option<u64>,

    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECONDS")]
    pub request_timeout_seconds: Option<u64>,

    /// Command run in each workspace to validate generated files
    #[arg(long, global = true, env = "LINTER_COMMAND")]
    pub linter_command: Option<String>,

    #[arg(long, global = true, env = "WORKSPACE_DIR")]
    pub workspace_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "SHARED_SECRET", hide_env_values = true)]
    pub shared_secret: Option<String>,

    #[arg(long, global = true, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Account or organisation that owns created repositories
    #[arg(long, global = true, env = "GITHUB_OWNER")]
    pub github_owner: Option<String>,
}

/// Shape of `sitesmith.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub github: GitHubSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shared_secret: Option<String>,
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    pub max_concurrent_tasks: Option<usize>,
    pub task_timeout_minutes: Option<u64>,
    pub linter_command: Option<String>,
    pub workspace_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub order: Option<Vec<String>>,
    pub request_timeout_seconds: Option<u64>,
    /// Keyed by provider name (`openai`, `groq`, ...)
    pub providers: BTreeMap<String, ProviderSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSection {
    pub token: Option<String>,
    pub owner: Option<String>,
}

impl FileSettings {
    /// Read `path`; a file that does not exist yields the defaults.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }
}

/// Resolved, immutable service settings.
#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub providers: ProviderSettings,
    pub max_concurrent_tasks: usize,
    pub task_timeout: Duration,
    pub linter_command: Option<String>,
    pub workspace_dir: Option<PathBuf>,
    pub shared_secret: Option<String>,
    pub cors_origins: Vec<String>,
    pub github_token: Option<String>,
    pub github_owner: Option<String>,
}

impl Settings {
    /// Settings file overlaid by flags and the process environment.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let file = FileSettings::read(&overrides.config)?;
        Self::resolve(file, overrides, |name| std::env::var(name).ok())
    }

    /// Merge `file` with `overrides`. API keys are looked up through `env`
    /// by each provider's variable name before falling back to the file.
    pub fn resolve(
        file: FileSettings,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let request_timeout = Duration::from_secs(
            overrides
                .request_timeout_seconds
                .or(file.llm.request_timeout_seconds)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        );
        let order = overrides
            .provider_order
            .clone()
            .or(file.llm.order.clone());
        let providers =
            resolve_providers(order.as_deref(), &file.llm.providers, &env)?
                .with_request_timeout(request_timeout);

        let task_timeout_minutes = overrides
            .task_timeout_minutes
            .or(file.agent.task_timeout_minutes)
            .unwrap_or(DEFAULT_TASK_TIMEOUT_MINUTES);
        if task_timeout_minutes == 0 {
            bail!("task timeout must be at least one minute");
        }

        Ok(Self {
            host: overrides
                .host
                .clone()
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            database_url: overrides
                .database_url
                .clone()
                .or(file.database.url)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            providers,
            max_concurrent_tasks: overrides
                .max_concurrent_tasks
                .or(file.agent.max_concurrent_tasks)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_TASKS)
                .max(1),
            task_timeout: Duration::from_secs(task_timeout_minutes.saturating_mul(60)),
            linter_command: non_blank(
                overrides
                    .linter_command
                    .clone()
                    .or(file.agent.linter_command),
            ),
            workspace_dir: overrides.workspace_dir.clone().or(file.agent.workspace_dir),
            shared_secret: non_blank(
                overrides
                    .shared_secret
                    .clone()
                    .or(file.server.shared_secret),
            ),
            cors_origins: overrides
                .cors_origins
                .clone()
                .or(file.server.cors_origins)
                .unwrap_or_default()
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            github_token: non_blank(overrides.github_token.clone().or(file.github.token)),
            github_owner: non_blank(overrides.github_owner.clone().or(file.github.owner)),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut linter = LinterConfig::default();
        if let Some(command) = &self.linter_command {
            linter = linter.with_command(command.clone());
        }

        let mut config = AgentConfig::default()
            .with_linter(linter)
            .with_task_timeout(self.task_timeout)
            .with_max_concurrent_tasks(self.max_concurrent_tasks);
        if let Some(dir) = &self.workspace_dir {
            config = config.with_workspace_root(dir.clone());
        }
        config
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Providers in priority order; those without an API key are left out.
fn resolve_providers(
    order: Option<&[String]>,
    sections: &BTreeMap<String, ProviderSection>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<ProviderSettings> {
    for name in sections.keys() {
        if ProviderKind::parse(name).is_none() {
            bail!("Unknown provider in settings file: {}", name);
        }
    }

    let kinds: Vec<ProviderKind> = match order {
        Some(names) => {
            let mut kinds = Vec::new();
            for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                let Some(kind) = ProviderKind::parse(name) else {
                    bail!("Unknown provider in provider order: {}", name);
                };
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            kinds
        }
        None => ProviderKind::ALL.to_vec(),
    };

    let mut providers = Vec::new();
    for kind in kinds {
        let section = sections
            .iter()
            .find(|(name, _)| ProviderKind::parse(name) == Some(kind))
            .map(|(_, section)| section.clone())
            .unwrap_or_default();

        let Some(api_key) = non_blank(env(kind.api_key_env()).or(section.api_key)) else {
            tracing::debug!(provider = %kind, "No API key, provider skipped");
            continue;
        };

        let mut config = ProviderConfig::new(kind, api_key);
        if let Some(model) = non_blank(section.model) {
            config = config.with_model(model);
        }
        if let Some(base_url) = non_blank(section.base_url) {
            config = config.with_base_url(base_url);
        }
        providers.push(config);
    }

    Ok(ProviderSettings::new(providers))
}

/// Filesystem path behind a `sqlite:` URL, when it names a file.
pub fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

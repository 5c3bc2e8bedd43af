use std::time::Duration;

use github::Deployment;
use serde::Serialize;
use sitesmith_core::Task;
use tracing::{error, info, warn};

use crate::error::{OrchestratorError, Result};

/// Retry schedule for evaluation callbacks.
#[derive(Debug, Clone)]
pub struct CallbackPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for CallbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CallbackPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Body POSTed to a task's evaluation URL once it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    Succeeded {
        email: String,
        task: String,
        round: u32,
        nonce: String,
        repo_url: String,
        commit_sha: String,
        pages_url: String,
    },
    Failed {
        email: String,
        task: String,
        round: u32,
        nonce: String,
        status: &'static str,
        error: String,
    },
}

impl CallbackPayload {
    pub fn succeeded(task: &Task, deployment: &Deployment) -> Self {
        Self::Succeeded {
            email: task.email.clone(),
            task: task.task.clone(),
            round: task.round,
            nonce: task.nonce.clone(),
            repo_url: deployment.repo_url.clone(),
            commit_sha: deployment.commit_sha.clone(),
            pages_url: deployment.pages_url.clone(),
        }
    }

    pub fn failed(task: &Task, error: impl Into<String>) -> Self {
        Self::Failed {
            email: task.email.clone(),
            task: task.task.clone(),
            round: task.round,
            nonce: task.nonce.clone(),
            status: "failed",
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackClient {
    http: reqwest::Client,
    policy: CallbackPolicy,
}

impl CallbackClient {
    pub fn new(policy: CallbackPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            policy,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn policy(&self) -> &CallbackPolicy {
        &self.policy
    }

    async fn post_once(&self, url: &str, payload: &CallbackPayload) -> std::result::Result<(), String> {
        let response = self
            .http
            .post(url)
            .timeout(self.policy.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("HTTP {}: {}", status.as_u16(), body.trim()))
        }
    }

    /// POST `payload`, retrying any failure with exponential backoff.
    ///
    /// Returns the number of attempts it took.
    pub async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<u32> {
        let mut attempt = 1;

        loop {
            match self.post_once(url, payload).await {
                Ok(()) => {
                    info!(url, attempt, "Callback delivered");
                    return Ok(attempt);
                }
                Err(reason) if attempt >= self.policy.max_attempts => {
                    error!(url, attempts = attempt, error = %reason, "Callback failed after retries");
                    return Err(OrchestratorError::Callback {
                        url: url.to_string(),
                        attempts: attempt,
                        reason,
                    });
                }
                Err(reason) => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %reason,
                        "Callback failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for CallbackClient {
    fn default() -> Self {
        Self::new(CallbackPolicy::default())
    }
}

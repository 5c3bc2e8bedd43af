use std::sync::Arc;

use db::TaskRepository;
use events::EventBus;
use orchestrator::TaskRunner;
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct AppState {
    pub task_repository: TaskRepository,
    pub event_bus: EventBus,
    pub runner: TaskRunner,
    /// SHA-256 of the configured shared secret
    secret_digest: Option<Arc<[u8; 32]>>,
    cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(task_repository: TaskRepository, event_bus: EventBus, runner: TaskRunner) -> Self {
        Self {
            task_repository,
            event_bus,
            runner,
            secret_digest: None,
            cors_origins: Vec::new(),
        }
    }

    /// Require submissions to carry `secret`. A blank secret disables the check.
    pub fn with_shared_secret(mut self, secret: Option<&str>) -> Self {
        self.secret_digest = secret
            .filter(|s| !s.is_empty())
            .map(|s| Arc::new(digest(s)));
        self
    }

    /// Allowed CORS origins; empty or `*` allows any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    pub fn requires_secret(&self) -> bool {
        self.secret_digest.is_some()
    }

    /// Whether `candidate` matches the shared secret. Always true when none is set.
    ///
    /// Digests are compared in full so the time taken does not depend on
    /// where the inputs differ.
    pub fn verify_secret(&self, candidate: &str) -> bool {
        let Some(expected) = self.secret_digest.as_deref() else {
            return true;
        };
        let actual = digest(candidate);
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

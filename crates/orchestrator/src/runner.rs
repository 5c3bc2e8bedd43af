use std::sync::Arc;
use std::time::Duration;

use sitesmith_core::Task;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::executor::{TaskExecutor, TaskOutcome};

/// Runs submitted tasks in the background, at most `max_concurrent_tasks` at once.
///
/// Each run is bounded by the task timeout. The callback is sent after the
/// bound, so a slow evaluation endpoint cannot time a finished task out.
#[derive(Clone)]
pub struct TaskRunner {
    executor: Arc<TaskExecutor>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl TaskRunner {
    pub fn new(executor: TaskExecutor) -> Self {
        let config = &executor.context().config;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        let timeout = config.task_timeout;
        Self {
            executor: Arc::new(executor),
            permits,
            timeout,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fail tasks a previous process left unfinished, then deliver their
    /// callbacks in the background. Run before accepting new submissions.
    pub async fn recover_interrupted(&self) -> crate::Result<usize> {
        let outcomes = self.executor.fail_interrupted().await?;
        let count = outcomes.len();
        if count > 0 {
            warn!(count, "Failed tasks interrupted by the last shutdown");
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                for outcome in &outcomes {
                    executor.notify(outcome).await;
                }
            });
        }
        Ok(count)
    }

    /// Queue `task` and return a handle resolving to its outcome.
    ///
    /// The handle yields `None` only when the failure could not be recorded.
    pub fn submit(&self, task: Task) -> JoinHandle<Option<TaskOutcome>> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(task).await })
    }

    async fn run(&self, task: Task) -> Option<TaskOutcome> {
        let task_id = task.id;
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Task runner is shut down");
                return None;
            }
        };
        info!(task_id = %task_id, "Task slot acquired");

        let outcome = match tokio::time::timeout(self.timeout, self.executor.execute(task.clone()))
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(task_id = %task_id, error = %e, "Task result could not be recorded");
                return None;
            }
            Err(_) => {
                let minutes = (self.timeout.as_secs() / 60).max(1);
                warn!(task_id = %task_id, minutes, "Task timed out");
                match self.executor.fail_timed_out(task, minutes).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Timeout could not be recorded");
                        return None;
                    }
                }
            }
        };

        self.executor.notify(&outcome).await;
        info!(
            task_id = %task_id,
            status = %outcome.status().as_str(),
            "Task finished"
        );
        Some(outcome)
    }
}

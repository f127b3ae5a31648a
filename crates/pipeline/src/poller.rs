//! Status polling for one asynchronous replacement job.
//!
//! [`JobPoller::run`] queries the status source immediately and then once
//! per interval until the job reaches a terminal state, the query budget is
//! spent, or the cancellation token fires. Each query is bounded by the
//! interval, so a run ends within roughly `max_polls * interval`.

use std::sync::Arc;

use showroom_core::job::{MSG_PROCESSING_TIMED_OUT, MSG_STATUS_UNAVAILABLE};
use showroom_core::replacement::StatusOutcome;
use showroom_remote::provider::ProviderError;
use showroom_remote::status::JobStatusSource;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;

/// Terminal result of polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { urls: Vec<String>, attempts: u32 },
    Failed { message: String, attempts: u32 },
}

pub struct JobPoller {
    source: Arc<dyn JobStatusSource>,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(source: Arc<dyn JobStatusSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Poll `job_id` to a terminal outcome.
    ///
    /// `on_attempt` is called with the 1-based attempt number after every
    /// query. Returns `None` if `cancel` fires first; nothing is reported
    /// for a cancelled job.
    pub async fn run<F>(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> Option<PollOutcome>
    where
        F: FnMut(u32) + Send,
    {
        let max_polls = self.config.max_polls.max(1);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;
        let mut last_query_failed = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id, attempts, "Job polling cancelled");
                    return None;
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id, attempts, "Job polling cancelled");
                    return None;
                }
                result = self.query(job_id) => result,
            };
            on_attempt(attempts);

            match result {
                Ok(StatusOutcome::Completed(urls)) => {
                    tracing::info!(job_id, attempts, count = urls.len(), "Job completed");
                    return Some(PollOutcome::Completed { urls, attempts });
                }
                Ok(StatusOutcome::Pending) => {
                    last_query_failed = false;
                    tracing::debug!(job_id, attempts, "Job still processing");
                }
                Ok(outcome) => {
                    let message = outcome
                        .failure_message()
                        .unwrap_or(MSG_PROCESSING_TIMED_OUT)
                        .to_string();
                    tracing::warn!(job_id, attempts, error = %message, "Job failed");
                    return Some(PollOutcome::Failed { message, attempts });
                }
                Err(e) => {
                    last_query_failed = true;
                    tracing::warn!(job_id, attempts, error = %e, "Job status query failed");
                }
            }

            if attempts >= max_polls {
                let message = if last_query_failed {
                    MSG_STATUS_UNAVAILABLE
                } else {
                    MSG_PROCESSING_TIMED_OUT
                };
                tracing::warn!(job_id, attempts, error = message, "Job poll budget exhausted");
                return Some(PollOutcome::Failed {
                    message: message.to_string(),
                    attempts,
                });
            }
        }
    }

    async fn query(&self, job_id: &str) -> Result<StatusOutcome, ProviderError> {
        match tokio::time::timeout(self.config.interval, self.source.job_status(job_id)).await {
            Ok(response) => Ok(response?.outcome()),
            Err(_) => Err(ProviderError::Timeout {
                provider: "status".into(),
                after: self.config.interval,
            }),
        }
    }
}

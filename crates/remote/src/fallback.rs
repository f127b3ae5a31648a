//! Primary-then-fallback submission strategy.
//!
//! [`FallbackSubmitter`] calls the primary provider under a timeout.
//! When that call fails or times out, the same request goes to the
//! fallback provider. If the fallback fails too, the primary error is
//! what the caller sees; the fallback error is kept alongside for logs.

use std::sync::Arc;
use std::time::Duration;

use showroom_core::replacement::{ReplacementRequest, ReplacementResponse, ResultSource};

use crate::provider::{BackgroundReplacementProvider, ProviderError};

/// Default per-call timeout for submissions.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// A submission response tagged with the provider stage that produced it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub response: ReplacementResponse,
    pub source: ResultSource,
}

/// Both stages failed (or there was no fallback).
///
/// Displays as the primary error so the fallback never masks the
/// original cause.
#[derive(Debug, thiserror::Error)]
#[error("{primary}")]
pub struct SubmitError {
    pub primary: ProviderError,
    pub fallback: Option<ProviderError>,
}

pub struct FallbackSubmitter {
    primary: Arc<dyn BackgroundReplacementProvider>,
    fallback: Option<Arc<dyn BackgroundReplacementProvider>>,
    timeout: Duration,
}

impl FallbackSubmitter {
    /// Submitter with only a primary stage and the default timeout.
    pub fn new(primary: Arc<dyn BackgroundReplacementProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn BackgroundReplacementProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `request`, falling back once if the primary stage fails.
    pub async fn submit(&self, request: &ReplacementRequest) -> Result<Submission, SubmitError> {
        let primary_err = match self.call(self.primary.as_ref(), request).await {
            Ok(response) => {
                return Ok(Submission {
                    response,
                    source: ResultSource::Primary,
                })
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            tracing::warn!(
                public_id = %request.public_id,
                error = %primary_err,
                "Primary submission failed and no fallback is configured",
            );
            return Err(SubmitError {
                primary: primary_err,
                fallback: None,
            });
        };

        tracing::warn!(
            public_id = %request.public_id,
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "Primary submission failed, using fallback",
        );

        match self.call(fallback.as_ref(), request).await {
            Ok(response) => {
                tracing::info!(
                    public_id = %request.public_id,
                    fallback = fallback.name(),
                    "Submission served by fallback",
                );
                Ok(Submission {
                    response,
                    source: ResultSource::Fallback,
                })
            }
            Err(fallback_err) => {
                tracing::warn!(
                    public_id = %request.public_id,
                    error = %fallback_err,
                    "Fallback submission failed as well",
                );
                Err(SubmitError {
                    primary: primary_err,
                    fallback: Some(fallback_err),
                })
            }
        }
    }

    /// One provider call bounded by the timeout. Dropping the future
    /// on timeout cancels the in-flight request.
    async fn call(
        &self,
        provider: &dyn BackgroundReplacementProvider,
        request: &ReplacementRequest,
    ) -> Result<ReplacementResponse, ProviderError> {
        match tokio::time::timeout(self.timeout, provider.replace_background(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.name().to_string(),
                after: self.timeout,
            }),
        }
    }
}

//! Background-replacement providers.
//!
//! A [`BackgroundReplacementProvider`] turns a [`ReplacementRequest`]
//! into a raw [`ReplacementResponse`]. Interpretation of the response is
//! left to `showroom_core::replacement::classify`; the fallback policy
//! lives in [`crate::fallback`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use showroom_core::replacement::{ReplacementRequest, ReplacementResponse};

use crate::api::{MediaApi, MediaApiError};

/// Errors a provider call can end with.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Api(#[from] MediaApiError),

    /// The call was abandoned after the configured timeout.
    #[error("{provider} did not respond within {}s", after.as_secs())]
    Timeout { provider: String, after: Duration },

    /// The provider could not even build the request.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Something that can replace the background of an image.
#[async_trait]
pub trait BackgroundReplacementProvider: Send + Sync {
    async fn replace_background(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementResponse, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Provider backed by one route of the media API.
///
/// The primary and the mock route share the same request and response
/// shape, so both are instances of this type.
pub struct HttpProvider {
    api: Arc<MediaApi>,
    path: String,
    name: String,
}

impl HttpProvider {
    pub fn new(api: Arc<MediaApi>, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            name: name.into(),
        }
    }

    /// The real transformation route.
    pub fn primary(api: Arc<MediaApi>, path: impl Into<String>) -> Self {
        Self::new(api, path, "primary")
    }

    /// The simulated route used when the primary fails.
    pub fn mock(api: Arc<MediaApi>, path: impl Into<String>) -> Self {
        Self::new(api, path, "mock")
    }
}

#[async_trait]
impl BackgroundReplacementProvider for HttpProvider {
    async fn replace_background(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementResponse, ProviderError> {
        tracing::debug!(
            provider = %self.name,
            public_id = %request.public_id,
            seed = ?request.seed,
            "Submitting background replacement",
        );
        Ok(self.api.submit(&self.path, request).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_name_providers() {
        let api = Arc::new(MediaApi::new("http://localhost:3000/api"));
        let primary = HttpProvider::primary(Arc::clone(&api), "/generative-fill");
        let mock = HttpProvider::mock(api, "/mock-fill");
        assert_eq!(primary.name(), "primary");
        assert_eq!(mock.name(), "mock");
        assert_eq!(mock.path, "/mock-fill");
    }

    #[test]
    fn timeout_display() {
        let err = ProviderError::Timeout {
            provider: "primary".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "primary did not respond within 30s");
    }

    #[test]
    fn api_errors_are_transparent() {
        let err = ProviderError::from(MediaApiError::ApiError {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(err.to_string(), "Media API error (500): boom");
    }
}

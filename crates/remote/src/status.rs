//! Job status lookups for asynchronous replacements.

use std::sync::Arc;

use async_trait::async_trait;
use showroom_core::replacement::JobStatusResponse;

use crate::api::MediaApi;
use crate::provider::ProviderError;

/// Answers "what is job X doing right now?".
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError>;
}

/// Status source backed by the media API's status route.
pub struct HttpStatusSource {
    api: Arc<MediaApi>,
    path: String,
}

impl HttpStatusSource {
    pub fn new(api: Arc<MediaApi>, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[async_trait]
impl JobStatusSource for HttpStatusSource {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError> {
        Ok(self.api.job_status(&self.path, job_id).await?)
    }
}

//! In-process stand-in for the media service.
//!
//! [`SimulatedProvider`] answers immediately with a generative
//! background-replace delivery URL built from the request. The URL is a
//! pure function of `(cloud, publicId, prompt, seed)`, so repeated
//! submissions produce the same preview. Used as the fallback stage when
//! no remote mock route is deployed.

use async_trait::async_trait;
use reqwest::Url;
use showroom_core::replacement::{ReplacementRequest, ReplacementResponse};
use showroom_core::seed::optimized_seed;

use crate::provider::{BackgroundReplacementProvider, ProviderError};

const DELIVERY_HOST: &str = "https://res.cloudinary.com";

pub struct SimulatedProvider {
    cloud_name: String,
}

impl SimulatedProvider {
    pub fn new(cloud_name: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
        }
    }
}

/// Delivery URL applying a generative background replacement.
///
/// Prompt and public id segments are percent-encoded; `/` inside the
/// public id is kept as a folder separator.
pub fn transformation_url(
    cloud_name: &str,
    public_id: &str,
    prompt: &str,
    seed: u32,
) -> Result<String, ProviderError> {
    let mut url = Url::parse(DELIVERY_HOST)
        .map_err(|e| ProviderError::Unavailable(format!("Invalid delivery host: {e}")))?;
    let transformation = format!("e_gen_background_replace:prompt_{prompt};seed_{seed}");
    url.path_segments_mut()
        .map_err(|_| ProviderError::Unavailable("Delivery host cannot carry a path".into()))?
        .extend([cloud_name, "image", "upload", transformation.as_str()])
        .extend(public_id.split('/'));
    Ok(url.into())
}

#[async_trait]
impl BackgroundReplacementProvider for SimulatedProvider {
    async fn replace_background(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementResponse, ProviderError> {
        let prompt = request.prompt.as_deref().unwrap_or_default();
        let seed = request
            .seed
            .unwrap_or_else(|| optimized_seed(&request.public_id, prompt));
        let url = transformation_url(&self.cloud_name, &request.public_id, prompt, seed)?;
        tracing::debug!(public_id = %request.public_id, url = %url, "Simulated replacement");
        Ok(ReplacementResponse::completed(vec![url]))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

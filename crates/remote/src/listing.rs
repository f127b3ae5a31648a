//! Persistence of listing images.
//!
//! The listing backend owns the data; the pipeline only hands it a full
//! replacement image array for one listing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use showroom_core::image::Image;
use tokio::sync::RwLock;

/// HTTP request timeout for a single save.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ListingStoreError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Listing backend error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Listing {0} not found")]
    NotFound(String),
}

/// Writes the full image array of a listing.
#[async_trait]
pub trait ListingImageStore: Send + Sync {
    async fn replace_images(
        &self,
        listing_id: &str,
        images: &[Image],
    ) -> Result<(), ListingStoreError>;
}

// ---------------------------------------------------------------------------
// REST backend
// ---------------------------------------------------------------------------

/// Listing store speaking to a REST backend:
/// `PATCH {base_url}/listings/{listing_id}` with `{"images": [...]}`.
pub struct RestListingStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestListingStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ListingStoreError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ListingImageStore for RestListingStore {
    async fn replace_images(
        &self,
        listing_id: &str,
        images: &[Image],
    ) -> Result<(), ListingStoreError> {
        let mut request = self
            .client
            .patch(format!("{}/listings/{}", self.base_url, listing_id))
            .json(&serde_json::json!({ "images": images }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ListingStoreError::NotFound(listing_id.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ListingStoreError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(listing_id, count = images.len(), "Listing images replaced");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Listing store kept in process memory.
#[derive(Default)]
pub struct InMemoryListingStore {
    listings: RwLock<HashMap<String, Vec<Image>>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a listing with its current images.
    pub async fn insert(&self, listing_id: impl Into<String>, images: Vec<Image>) {
        self.listings.write().await.insert(listing_id.into(), images);
    }

    pub async fn images(&self, listing_id: &str) -> Option<Vec<Image>> {
        self.listings.read().await.get(listing_id).cloned()
    }
}

#[async_trait]
impl ListingImageStore for InMemoryListingStore {
    async fn replace_images(
        &self,
        listing_id: &str,
        images: &[Image],
    ) -> Result<(), ListingStoreError> {
        let mut listings = self.listings.write().await;
        let slot = listings
            .get_mut(listing_id)
            .ok_or_else(|| ListingStoreError::NotFound(listing_id.to_string()))?;
        *slot = images.to_vec();
        Ok(())
    }
}

//! REST client for the media transformation routes.
//!
//! Wraps background-replacement submission and job status queries
//! using [`reqwest`]. Route paths are passed in by the caller so the
//! same client serves both the primary and the mock route.

use showroom_core::replacement::{JobStatusResponse, ReplacementRequest, ReplacementResponse};

/// HTTP client for one media API deployment.
pub struct MediaApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the media REST layer.
#[derive(Debug, thiserror::Error)]
pub enum MediaApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The route returned a non-2xx status code.
    #[error("Media API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The route answered 2xx but the body carries an `error` field.
    #[error("Media API rejected the request: {message}")]
    Rejected { message: String },
}

impl MediaApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:3000/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Submit a background replacement to the route at `path`.
    ///
    /// Sends `POST {api_url}{path}` with `{publicId, prompt, seed}`.
    /// A 2xx body that carries `error` is reported as
    /// [`MediaApiError::Rejected`].
    pub async fn submit(
        &self,
        path: &str,
        request: &ReplacementRequest,
    ) -> Result<ReplacementResponse, MediaApiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(request)
            .send()
            .await?;

        let body: ReplacementResponse = Self::parse_response(response).await?;
        if let Some(message) = body.error_message() {
            return Err(MediaApiError::Rejected { message });
        }
        Ok(body)
    }

    /// Query the status of an asynchronous job.
    ///
    /// Sends `GET {api_url}{path}?jobId={job_id}`.
    pub async fn job_status(
        &self,
        path: &str,
        job_id: &str,
    ) -> Result<JobStatusResponse, MediaApiError> {
        let response = self
            .client
            .get(self.url(path))
            .query(&[("jobId", job_id)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.api_url, path)
        } else {
            format!("{}/{}", self.api_url, path)
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`MediaApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, MediaApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MediaApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MediaApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

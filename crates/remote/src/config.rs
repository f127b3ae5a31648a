//! Remote service configuration and client wiring.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::api::MediaApi;
use crate::fallback::FallbackSubmitter;
use crate::listing::{ListingImageStore, ListingStoreError, RestListingStore};
use crate::provider::{BackgroundReplacementProvider, HttpProvider};
use crate::simulated::SimulatedProvider;
use crate::status::HttpStatusSource;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `var`, falling back to `default` when unset.
pub fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Read `var` and parse it, falling back to `default` when unset.
pub fn env_parse<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Which provider takes over when the primary route fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// The media API's mock route.
    Remote,
    /// [`SimulatedProvider`], no network involved.
    Simulated,
    /// No fallback; primary errors surface directly.
    Disabled,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "simulated" => Ok(Self::Simulated),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(format!(
                "unknown fallback mode '{other}', expected remote, simulated or disabled"
            )),
        }
    }
}

/// Endpoints and credentials for the external services.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub media_api_url: String,
    pub submit_path: String,
    pub mock_path: String,
    pub status_path: String,
    pub fallback: FallbackMode,
    /// Cloud name used in simulated delivery URLs.
    pub cloud_name: String,
    /// Listing backend; `None` means selections cannot be saved.
    pub listing_api_url: Option<String>,
    pub listing_api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            media_api_url: "http://localhost:3000/api".into(),
            submit_path: "/generative-fill".into(),
            mock_path: "/mock-fill".into(),
            status_path: "/job-status".into(),
            fallback: FallbackMode::Remote,
            cloud_name: "demo".into(),
            listing_api_url: None,
            listing_api_key: None,
        }
    }
}

impl RemoteConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default                     |
    /// |---------------------|-----------------------------|
    /// | `MEDIA_API_URL`     | `http://localhost:3000/api` |
    /// | `MEDIA_SUBMIT_PATH` | `/generative-fill`          |
    /// | `MEDIA_MOCK_PATH`   | `/mock-fill`                |
    /// | `MEDIA_STATUS_PATH` | `/job-status`               |
    /// | `MEDIA_FALLBACK`    | `remote`                    |
    /// | `MEDIA_CLOUD_NAME`  | `demo`                      |
    /// | `LISTING_API_URL`   | unset                       |
    /// | `LISTING_API_KEY`   | unset                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            media_api_url: env_or("MEDIA_API_URL", &defaults.media_api_url),
            submit_path: env_or("MEDIA_SUBMIT_PATH", &defaults.submit_path),
            mock_path: env_or("MEDIA_MOCK_PATH", &defaults.mock_path),
            status_path: env_or("MEDIA_STATUS_PATH", &defaults.status_path),
            fallback: env_parse("MEDIA_FALLBACK", defaults.fallback)?,
            cloud_name: env_or("MEDIA_CLOUD_NAME", &defaults.cloud_name),
            listing_api_url: std::env::var("LISTING_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            listing_api_key: std::env::var("LISTING_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Build the primary/fallback submitter described by this config.
    pub fn submitter(&self, api: &Arc<MediaApi>, timeout: Duration) -> FallbackSubmitter {
        let primary = Arc::new(HttpProvider::primary(Arc::clone(api), &self.submit_path));
        let submitter = FallbackSubmitter::new(primary).with_timeout(timeout);
        let fallback: Arc<dyn BackgroundReplacementProvider> = match self.fallback {
            FallbackMode::Remote => Arc::new(HttpProvider::mock(Arc::clone(api), &self.mock_path)),
            FallbackMode::Simulated => Arc::new(SimulatedProvider::new(&self.cloud_name)),
            FallbackMode::Disabled => return submitter,
        };
        submitter.with_fallback(fallback)
    }

    pub fn status_source(&self, api: &Arc<MediaApi>) -> HttpStatusSource {
        HttpStatusSource::new(Arc::clone(api), &self.status_path)
    }

    /// The configured listing store, if any.
    pub fn listing_store(&self) -> Result<Option<Arc<dyn ListingImageStore>>, ListingStoreError> {
        match &self.listing_api_url {
            Some(url) => {
                let store: Arc<dyn ListingImageStore> =
                    Arc::new(RestListingStore::new(url, self.listing_api_key.clone())?);
                Ok(Some(store))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_mode_parses() {
        assert_eq!("remote".parse::<FallbackMode>().unwrap(), FallbackMode::Remote);
        assert_eq!(
            "Simulated".parse::<FallbackMode>().unwrap(),
            FallbackMode::Simulated
        );
        assert_eq!("none".parse::<FallbackMode>().unwrap(), FallbackMode::Disabled);
        assert!("sometimes".parse::<FallbackMode>().is_err());
    }

    #[test]
    fn env_parse_uses_default_when_unset() {
        let value: u64 = env_parse("SHOWROOM_TEST_SURELY_UNSET_VAR", 12).unwrap();
        assert_eq!(value, 12);
    }

    #[test]
    fn defaults_point_at_local_routes() {
        let config = RemoteConfig::default();
        assert_eq!(config.submit_path, "/generative-fill");
        assert_eq!(config.mock_path, "/mock-fill");
        assert_eq!(config.fallback, FallbackMode::Remote);
        assert!(config.listing_store().unwrap().is_none());
    }

    #[test]
    fn submitter_uses_given_timeout() {
        let api = Arc::new(MediaApi::new("http://localhost:3000/api"));
        let config = RemoteConfig {
            fallback: FallbackMode::Simulated,
            ..Default::default()
        };
        let submitter = config.submitter(&api, Duration::from_secs(5));
        assert_eq!(submitter.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid {
            var: "MAX_POLLS",
            value: "lots".into(),
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(
            err.to_string(),
            "MAX_POLLS has invalid value 'lots': invalid digit found in string"
        );
    }
}

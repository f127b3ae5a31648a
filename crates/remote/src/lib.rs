//! Clients for the services the pipeline depends on.
//!
//! Provides the REST wrapper for the media routes, the
//! background-replacement provider strategy (primary with fallback),
//! the job status source used by the poller, and the listing image
//! store that persists confirmed selections.

pub mod api;
pub mod config;
pub mod fallback;
pub mod listing;
pub mod provider;
pub mod simulated;
pub mod status;

//! Batch orchestration for background replacement.
//!
//! [`BatchCoordinator`](coordinator::BatchCoordinator) submits every image
//! of a batch through the fallback submitter, hands asynchronous jobs to
//! [`JobPoller`](poller::JobPoller) tasks, folds all outcomes into a
//! shared [`BatchState`](showroom_core::batch::BatchState), and saves the
//! confirmed selections back to the listing.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod poller;

pub use config::{PipelineConfig, PollConfig};
pub use coordinator::{BatchCoordinator, BatchReport};
pub use error::{BatchError, SaveError};
pub use events::{BatchEvent, BatchEventKind, BatchEvents};

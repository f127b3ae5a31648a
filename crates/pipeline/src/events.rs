//! Progress notifications for batch runs.
//!
//! [`BatchEvents`] fans every [`BatchEvent`] out over a
//! `tokio::sync::broadcast` channel. Subscribers that fall behind observe
//! `RecvError::Lagged`; publishing never blocks the pipeline.

use chrono::Utc;
use serde::Serialize;
use showroom_core::batch::BatchSummary;
use showroom_core::replacement::ResultSource;
use showroom_core::types::{JobId, PublicId, Timestamp};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BatchEvent
// ---------------------------------------------------------------------------

/// Something that happened during a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEventKind {
    Started {
        total: usize,
    },
    /// Submission progress; `percent` never decreases within a run.
    Progress {
        submitted: usize,
        total: usize,
        percent: u8,
    },
    ImageSubmitted {
        public_id: PublicId,
        source: ResultSource,
        is_async: bool,
    },
    ImageFailed {
        public_id: PublicId,
        error: String,
    },
    JobRegistered {
        public_id: PublicId,
        job_id: JobId,
        /// Low-resolution preview sent along with the job, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        preview_url: Option<String>,
    },
    JobPolled {
        public_id: PublicId,
        job_id: JobId,
        attempt: u32,
    },
    JobCompleted {
        public_id: PublicId,
        job_id: JobId,
        urls: Vec<String>,
    },
    JobFailed {
        public_id: PublicId,
        job_id: JobId,
        message: String,
    },
    /// Submission finished but some jobs are still running.
    StillProcessing {
        pending: usize,
    },
    /// Every image of the run reached a terminal state.
    Completed {
        summary: BatchSummary,
    },
    /// No image of the run produced a usable result.
    Failed {
        message: String,
    },
    SelectionSaved {
        listing_id: String,
        applied: usize,
    },
}

/// A [`BatchEventKind`] stamped with its run and creation time.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvent {
    /// Run the event belongs to; absent for events outside a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: BatchEventKind,
    pub timestamp: Timestamp,
}

impl BatchEvent {
    pub fn new(batch_id: Option<Uuid>, kind: BatchEventKind) -> Self {
        Self {
            batch_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchEvents
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 256;

pub struct BatchEvents {
    sender: broadcast::Sender<BatchEvent>,
}

impl BatchEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when there are none.
    pub fn publish(&self, batch_id: Option<Uuid>, kind: BatchEventKind) {
        let _ = self.sender.send(BatchEvent::new(batch_id, kind));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }
}

impl Default for BatchEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let events = BatchEvents::default();
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();
        let batch_id = Uuid::new_v4();

        events.publish(Some(batch_id), BatchEventKind::Started { total: 3 });

        let first = rx1.recv().await.unwrap();
        let second = rx2.recv().await.unwrap();
        assert_eq!(first.batch_id, Some(batch_id));
        assert_eq!(first.kind, BatchEventKind::Started { total: 3 });
        assert_eq!(second.kind, first.kind);
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let events = BatchEvents::default();
        events.publish(None, BatchEventKind::Failed { message: "x".into() });
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = BatchEvent::new(
            None,
            BatchEventKind::JobPolled {
                public_id: "img".into(),
                job_id: "job-1".into(),
                attempt: 2,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_polled");
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["attempt"], 2);
        assert!(json.get("batch_id").is_none());
    }

    #[test]
    fn job_registered_omits_missing_preview() {
        let kind = |preview_url: Option<&str>| BatchEventKind::JobRegistered {
            public_id: "img".into(),
            job_id: "job-1".into(),
            preview_url: preview_url.map(String::from),
        };
        let with = serde_json::to_value(BatchEvent::new(None, kind(Some("low.jpg")))).unwrap();
        let without = serde_json::to_value(BatchEvent::new(None, kind(None))).unwrap();
        assert_eq!(with["preview_url"], "low.jpg");
        assert!(without.get("preview_url").is_none());
    }
}

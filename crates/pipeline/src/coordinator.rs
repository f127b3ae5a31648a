//! Batch run orchestration.
//!
//! [`BatchCoordinator`] owns the shared [`BatchState`]. A run validates
//! its input, clears prior state for the images it covers, then submits
//! them one at a time through the [`FallbackSubmitter`]. Synchronous
//! previews are recorded as they arrive; asynchronous jobs get a
//! [`JobPoller`] task each, so several jobs poll concurrently while the
//! rest of the batch is still being submitted.
//!
//! All state changes go through [`BatchState::apply`] under one mutex, so
//! job callbacks and user selections never interleave mid-update.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use showroom_core::batch::{progress_percent, Applied, BatchAction, BatchState, BatchSummary};
use showroom_core::error::CoreError;
use showroom_core::image::Image;
use showroom_core::replacement::{classify, ProcessingResult, ReplacementRequest};
use showroom_core::seed::optimized_seed;
use showroom_core::selection::{count_applicable, merge_selections};
use showroom_core::types::{JobId, PublicId};
use showroom_remote::fallback::FallbackSubmitter;
use showroom_remote::listing::ListingImageStore;
use showroom_remote::status::JobStatusSource;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{BatchError, SaveError};
use crate::events::{BatchEvent, BatchEventKind, BatchEvents};
use crate::poller::{JobPoller, PollOutcome};

/// How long [`BatchCoordinator::shutdown`] waits for each poll task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a run produced by the time submission finished.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// One entry per submitted image, in input order.
    pub results: Vec<ProcessingResult>,
    /// Snapshot taken after the last submission; async jobs may still
    /// be counted as processing.
    pub summary: BatchSummary,
}

pub struct BatchCoordinator {
    submitter: FallbackSubmitter,
    poller: Arc<JobPoller>,
    store: Option<Arc<dyn ListingImageStore>>,
    shared: Arc<Shared>,
    /// Master token; every poll task runs under a child of it.
    cancel: CancellationToken,
}

/// State reachable from spawned poll tasks.
struct Shared {
    tracked: Mutex<Tracked>,
    events: BatchEvents,
    /// Woken whenever a job reaches a terminal state or a run finishes
    /// submitting.
    settled: Notify,
}

#[derive(Default)]
struct Tracked {
    state: BatchState,
    /// Runs that have not published `Completed` yet. Runs may overlap.
    runs: HashMap<Uuid, Run>,
    active: HashMap<PublicId, ActiveJob>,
}

struct Run {
    ids: Vec<PublicId>,
    submitting: bool,
}

struct ActiveJob {
    job_id: JobId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BatchCoordinator {
    pub fn new(
        submitter: FallbackSubmitter,
        status: Arc<dyn JobStatusSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            submitter,
            poller: Arc::new(JobPoller::new(status, config.poll)),
            store: None,
            shared: Arc::new(Shared {
                tracked: Mutex::new(Tracked::default()),
                events: BatchEvents::default(),
                settled: Notify::new(),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Enable [`save_batch_selection`](Self::save_batch_selection).
    pub fn with_listing_store(mut self, store: Arc<dyn ListingImageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.shared.events.subscribe()
    }

    /// Copy of the current batch state.
    pub async fn state(&self) -> BatchState {
        self.shared.tracked.lock().await.state.clone()
    }

    /// Submit every image with `prompt`.
    ///
    /// Per-image failures are recorded and do not stop the run. Returns
    /// [`BatchError::AllFailed`] when no image produced a usable result.
    /// Asynchronous jobs keep polling after this returns; use
    /// [`wait_for_jobs`](Self::wait_for_jobs) to wait for them.
    pub async fn process_batch_background(
        &self,
        images: &[Image],
        prompt: &str,
    ) -> Result<BatchReport, BatchError> {
        let prompt = prompt.trim();
        let ids = validate_batch(images, prompt)?;
        let batch_id = Uuid::new_v4();
        let total = images.len();

        tracing::info!(%batch_id, total, prompt, "Background batch started");
        self.begin_run(batch_id, &ids).await;
        self.publish(batch_id, BatchEventKind::Started { total });

        let mut results = Vec::with_capacity(total);
        for (index, image) in images.iter().enumerate() {
            let result = self.submit_image(batch_id, image, prompt).await;
            results.push(self.record(batch_id, result).await);
            self.publish(
                batch_id,
                BatchEventKind::Progress {
                    submitted: index + 1,
                    total,
                    percent: progress_percent(index, total),
                },
            );
        }

        self.finish_run(batch_id, results).await
    }

    /// Wait until no job is running, then return the overall summary.
    ///
    /// Returns early after [`shutdown`](Self::shutdown).
    pub async fn wait_for_jobs(&self) -> BatchSummary {
        loop {
            let settled = self.shared.settled.notified();
            {
                let tracked = self.shared.tracked.lock().await;
                let submitting = tracked.runs.values().any(|r| r.submitting);
                if (tracked.state.is_done() && !submitting) || self.cancel.is_cancelled() {
                    return tracked.state.summary();
                }
            }
            tokio::select! {
                _ = settled => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// Choose `url` as the preview to keep for `public_id`.
    pub async fn select(&self, public_id: &str, url: &str) -> Result<(), CoreError> {
        let mut tracked = self.shared.tracked.lock().await;
        tracked.state.apply(BatchAction::Select {
            public_id: public_id.to_string(),
            url: url.to_string(),
        })?;
        tracing::debug!(public_id, url, "Preview selected");
        Ok(())
    }

    /// Write `selections` into `images` and persist them on the listing.
    ///
    /// Batch state is cleared only after the store accepts the update; on
    /// failure it is left untouched so the user can retry.
    pub async fn save_batch_selection(
        &self,
        listing_id: &str,
        images: &[Image],
        selections: &BTreeMap<PublicId, String>,
    ) -> Result<Vec<Image>, SaveError> {
        let Some(store) = &self.store else {
            tracing::error!(listing_id, "Cannot save selections: no listing store configured");
            return Err(SaveError::StoreUnavailable);
        };

        let applied = count_applicable(images, selections);
        let updated = merge_selections(images, selections);
        if let Err(e) = store.replace_images(listing_id, &updated).await {
            tracing::error!(listing_id, error = %e, "Failed to save batch selection");
            return Err(e.into());
        }

        let mut tracked = self.shared.tracked.lock().await;
        for (_, job) in tracked.active.drain() {
            job.cancel.cancel();
        }
        // Reset cannot fail.
        let _ = tracked.state.apply(BatchAction::Reset);
        tracked.runs.clear();
        drop(tracked);
        self.shared.settled.notify_waiters();

        tracing::info!(listing_id, applied, "Batch selection saved");
        self.shared.events.publish(
            None,
            BatchEventKind::SelectionSaved {
                listing_id: listing_id.to_string(),
                applied,
            },
        );
        Ok(updated)
    }

    /// [`save_batch_selection`](Self::save_batch_selection) with the
    /// selections currently held in batch state.
    pub async fn save_current_selection(
        &self,
        listing_id: &str,
        images: &[Image],
    ) -> Result<Vec<Image>, SaveError> {
        let selections = self.shared.tracked.lock().await.state.selected().clone();
        self.save_batch_selection(listing_id, images, &selections).await
    }

    /// Cancel every poll task and wait briefly for each to stop.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down batch coordinator");
        self.cancel.cancel();

        let active: Vec<(PublicId, ActiveJob)> =
            self.shared.tracked.lock().await.active.drain().collect();
        for (public_id, job) in active {
            tracing::debug!(public_id = %public_id, job_id = %job.job_id, "Stopping poll task");
            job.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, job.handle).await;
        }

        self.shared.settled.notify_waiters();
        tracing::info!("Batch coordinator shut down");
    }

    // ---- private helpers ----

    fn publish(&self, batch_id: Uuid, kind: BatchEventKind) {
        self.shared.events.publish(Some(batch_id), kind);
    }

    /// Cancel pollers for the run's images and forget their prior state.
    async fn begin_run(&self, batch_id: Uuid, ids: &[PublicId]) {
        let mut tracked = self.shared.tracked.lock().await;
        for id in ids {
            if let Some(job) = tracked.active.remove(id) {
                tracing::info!(public_id = %id, job_id = %job.job_id, "Cancelling superseded job");
                job.cancel.cancel();
            }
        }
        let _ = tracked.state.apply(BatchAction::Clear(ids.to_vec()));
        tracked.runs.insert(
            batch_id,
            Run {
                ids: ids.to_vec(),
                submitting: true,
            },
        );
        // Cancelling jobs above may have settled an earlier run.
        announce_settled(&mut tracked, &self.shared.events);
    }

    async fn submit_image(&self, batch_id: Uuid, image: &Image, prompt: &str) -> ProcessingResult {
        let public_id = &image.public_id;
        let seed = optimized_seed(public_id, prompt);
        let request = ReplacementRequest::new(public_id, prompt, seed);

        match self.submitter.submit(&request).await {
            Ok(submission) => {
                let result = ProcessingResult::from_classification(
                    public_id,
                    classify(&submission.response),
                    submission.source,
                );
                tracing::debug!(
                    %batch_id,
                    public_id = %public_id,
                    seed,
                    source = ?submission.source,
                    is_async = result.is_async,
                    "Image submitted",
                );
                result
            }
            Err(e) => {
                tracing::warn!(
                    %batch_id,
                    public_id = %public_id,
                    error = %e,
                    fallback_error = ?e.fallback.as_ref().map(ToString::to_string),
                    "Image submission failed",
                );
                ProcessingResult::failure(public_id, e.to_string())
            }
        }
    }

    /// Fold one submission result into state, starting a poller for
    /// async jobs. Returns the result as recorded.
    async fn record(&self, batch_id: Uuid, result: ProcessingResult) -> ProcessingResult {
        let mut tracked = self.shared.tracked.lock().await;
        let result = match tracked.state.apply(BatchAction::Record(result.clone())) {
            Ok(_) => result,
            Err(e) => {
                tracing::warn!(%batch_id, public_id = %result.original, error = %e, "Result rejected");
                // Recording the failure forgets the image's current job.
                if let Some(job) = tracked.active.remove(&result.original) {
                    tracing::info!(
                        public_id = %result.original,
                        job_id = %job.job_id,
                        "Cancelling job displaced by rejected result",
                    );
                    job.cancel.cancel();
                }
                let failed = ProcessingResult::failure(result.original, e.to_string());
                let _ = tracked.state.apply(BatchAction::Record(failed.clone()));
                announce_settled(&mut tracked, &self.shared.events);
                failed
            }
        };

        let public_id = result.original.clone();
        match (&result.error, &result.job_id) {
            (Some(error), _) => {
                self.publish(
                    batch_id,
                    BatchEventKind::ImageFailed {
                        public_id,
                        error: error.clone(),
                    },
                );
            }
            (None, Some(job_id)) if result.is_async => {
                self.publish(
                    batch_id,
                    BatchEventKind::JobRegistered {
                        public_id: public_id.clone(),
                        job_id: job_id.clone(),
                        preview_url: result.preview_url.clone(),
                    },
                );
                let job = self.spawn_poller(batch_id, public_id.clone(), job_id.clone());
                if let Some(previous) = tracked.active.insert(public_id, job) {
                    previous.cancel.cancel();
                }
            }
            _ => {}
        }
        if let Some(source) = result.source.filter(|_| result.error.is_none()) {
            self.publish(
                batch_id,
                BatchEventKind::ImageSubmitted {
                    public_id: result.original.clone(),
                    source,
                    is_async: result.is_async,
                },
            );
        }
        result
    }

    fn spawn_poller(&self, batch_id: Uuid, public_id: PublicId, job_id: JobId) -> ActiveJob {
        let cancel = self.cancel.child_token();
        let task_cancel = cancel.clone();
        let poller = Arc::clone(&self.poller);
        let shared = Arc::clone(&self.shared);
        let task_job_id = job_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = {
                let events = &shared.events;
                let (public_id, job_id) = (&public_id, &task_job_id);
                poller
                    .run(job_id, &task_cancel, |attempt| {
                        events.publish(
                            Some(batch_id),
                            BatchEventKind::JobPolled {
                                public_id: public_id.clone(),
                                job_id: job_id.clone(),
                                attempt,
                            },
                        );
                    })
                    .await
            };
            if let Some(outcome) = outcome {
                shared.settle(batch_id, public_id, task_job_id, outcome).await;
            }
        });

        ActiveJob {
            job_id,
            cancel,
            handle,
        }
    }

    async fn finish_run(
        &self,
        batch_id: Uuid,
        results: Vec<ProcessingResult>,
    ) -> Result<BatchReport, BatchError> {
        let mut tracked = self.shared.tracked.lock().await;
        let ids: Vec<PublicId> = results.iter().map(|r| r.original.clone()).collect();
        let summary = tracked.state.summary_for(&ids);
        // A save during submission forgets the run.
        let current = match tracked.runs.get_mut(&batch_id) {
            Some(run) => {
                run.submitting = false;
                true
            }
            None => false,
        };

        if !results.iter().any(ProcessingResult::is_usable) {
            let first_error = results
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_default();
            tracked.runs.remove(&batch_id);
            drop(tracked);
            self.shared.settled.notify_waiters();
            tracing::error!(%batch_id, total = results.len(), error = %first_error, "All images failed");
            self.publish(
                batch_id,
                BatchEventKind::Failed {
                    message: first_error.clone(),
                },
            );
            return Err(BatchError::AllFailed {
                total: results.len(),
                first_error,
            });
        }

        if current && !summary.is_done() {
            tracing::info!(%batch_id, pending = summary.processing, "Some images still processing");
            self.publish(
                batch_id,
                BatchEventKind::StillProcessing {
                    pending: summary.processing,
                },
            );
        }
        announce_settled(&mut tracked, &self.shared.events);
        drop(tracked);
        self.shared.settled.notify_waiters();

        Ok(BatchReport {
            batch_id,
            results,
            summary,
        })
    }
}

impl Shared {
    /// Apply a poller's terminal outcome.
    async fn settle(&self, batch_id: Uuid, public_id: PublicId, job_id: JobId, outcome: PollOutcome) {
        let mut tracked = self.tracked.lock().await;
        if tracked
            .active
            .get(&public_id)
            .is_some_and(|job| job.job_id == job_id)
        {
            tracked.active.remove(&public_id);
        }

        let attempts = match &outcome {
            PollOutcome::Completed { attempts, .. } | PollOutcome::Failed { attempts, .. } => {
                *attempts
            }
        };
        let (action, event) = match outcome {
            PollOutcome::Completed { urls, .. } => (
                BatchAction::JobCompleted {
                    public_id: public_id.clone(),
                    job_id: job_id.clone(),
                    urls: urls.clone(),
                },
                BatchEventKind::JobCompleted {
                    public_id: public_id.clone(),
                    job_id: job_id.clone(),
                    urls,
                },
            ),
            PollOutcome::Failed { message, .. } => (
                BatchAction::JobFailed {
                    public_id: public_id.clone(),
                    job_id: job_id.clone(),
                    message: message.clone(),
                },
                BatchEventKind::JobFailed {
                    public_id: public_id.clone(),
                    job_id: job_id.clone(),
                    message,
                },
            ),
        };

        match tracked.state.apply(action) {
            Ok(Applied::Changed) => {
                tracing::debug!(%public_id, %job_id, attempts, "Job settled");
                self.events.publish(Some(batch_id), event);
                announce_settled(&mut tracked, &self.events);
            }
            Ok(Applied::Ignored) => {
                tracing::debug!(%public_id, %job_id, attempts, "Ignoring update for superseded job");
            }
            Err(e) => {
                tracing::warn!(%public_id, %job_id, error = %e, "Job update rejected");
            }
        }
        drop(tracked);
        self.settled.notify_waiters();
    }
}

/// Publish `Completed` for every run that finished submitting and has no
/// job left in flight. Announced runs are forgotten, so each run is
/// announced at most once.
fn announce_settled(tracked: &mut Tracked, events: &BatchEvents) {
    let settled: Vec<Uuid> = tracked
        .runs
        .iter()
        .filter(|(_, run)| !run.submitting && tracked.state.summary_for(&run.ids).is_done())
        .map(|(id, _)| *id)
        .collect();
    for batch_id in settled {
        let Some(run) = tracked.runs.remove(&batch_id) else {
            continue;
        };
        let summary = tracked.state.summary_for(&run.ids);
        tracing::info!(
            %batch_id,
            completed = summary.completed,
            failed = summary.failed,
            "Background batch completed",
        );
        events.publish(Some(batch_id), BatchEventKind::Completed { summary });
    }
}

/// Reject empty prompts, empty batches and duplicate images.
fn validate_batch(images: &[Image], prompt: &str) -> Result<Vec<PublicId>, CoreError> {
    if prompt.is_empty() {
        return Err(CoreError::Validation("Background prompt must not be empty".into()));
    }
    if images.is_empty() {
        return Err(CoreError::Validation("Batch contains no images".into()));
    }
    let mut seen = HashSet::with_capacity(images.len());
    for image in images {
        if image.public_id.trim().is_empty() {
            return Err(CoreError::Validation("Image has an empty public id".into()));
        }
        if !seen.insert(image.public_id.as_str()) {
            return Err(CoreError::Validation(format!(
                "Image {} appears more than once in the batch",
                image.public_id
            )));
        }
    }
    Ok(images.iter().map(|i| i.public_id.clone()).collect())
}

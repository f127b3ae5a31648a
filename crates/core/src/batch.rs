//! Aggregate state of one background-replacement batch.
//!
//! [`BatchState`] is only changed through [`BatchState::apply`], one
//! [`BatchAction`] at a time. Callbacks from concurrently finishing jobs
//! are therefore applied in whatever order they arrive, and each one
//! sees the state left by the previous one.
//!
//! Invariants upheld by `apply`:
//! - an image has at most one non-terminal job;
//! - `selected[id]`, when present, is one of `previews[id]`;
//! - each image is in at most one bucket: previews, failures, or a
//!   pending job.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CoreError;
use crate::job::{ProcessingJob, MSG_NO_RESULT_URLS};
use crate::replacement::ProcessingResult;
use crate::types::{JobId, PublicId};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Percentage of a batch submitted after image `index` (zero-based).
///
/// Non-decreasing in `index` and exactly 100 for the last image.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = (index + 1).min(total);
    ((done * 100) / total) as u8
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAction {
    /// Drop everything, e.g. after a successful save.
    Reset,
    /// Drop all state for the given images before reprocessing them.
    Clear(Vec<PublicId>),
    /// Fold in the submission result for one image.
    Record(ProcessingResult),
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
    /// User picked a different candidate for an image.
    Select { public_id: PublicId, url: String },
}

/// Whether an action changed the state.
///
/// Job callbacks for jobs that were cleared, replaced, or already
/// finished are `Ignored` rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Ignored,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
}

impl BatchSummary {
    /// No job is still running.
    pub fn is_done(&self) -> bool {
        self.processing == 0
    }

    /// Every image failed.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchState {
    previews: BTreeMap<PublicId, Vec<String>>,
    selected: BTreeMap<PublicId, String>,
    jobs: Vec<ProcessingJob>,
    failures: BTreeMap<PublicId, String>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previews(&self) -> &BTreeMap<PublicId, Vec<String>> {
        &self.previews
    }

    pub fn selected(&self) -> &BTreeMap<PublicId, String> {
        &self.selected
    }

    pub fn jobs(&self) -> &[ProcessingJob] {
        &self.jobs
    }

    pub fn failures(&self) -> &BTreeMap<PublicId, String> {
        &self.failures
    }

    /// The non-terminal job for an image, if any.
    pub fn active_job(&self, public_id: &str) -> Option<&ProcessingJob> {
        self.jobs
            .iter()
            .find(|j| j.public_id == public_id && !j.is_terminal())
    }

    pub fn is_done(&self) -> bool {
        self.jobs.iter().all(ProcessingJob::is_terminal)
    }

    pub fn summary(&self) -> BatchSummary {
        let processing = self.jobs.iter().filter(|j| !j.is_terminal()).count();
        let completed = self.previews.len();
        let failed = self.failures.len();
        BatchSummary {
            total: completed + failed + processing,
            completed,
            failed,
            processing,
        }
    }

    /// Summary restricted to `ids`. Images with no state yet count
    /// towards `total` only.
    pub fn summary_for(&self, ids: &[PublicId]) -> BatchSummary {
        let mut summary = BatchSummary {
            total: ids.len(),
            ..Default::default()
        };
        for id in ids {
            if self.previews.contains_key(id) {
                summary.completed += 1;
            } else if self.failures.contains_key(id) {
                summary.failed += 1;
            } else if self.active_job(id).is_some() {
                summary.processing += 1;
            }
        }
        summary
    }

    pub fn apply(&mut self, action: BatchAction) -> Result<Applied, CoreError> {
        match action {
            BatchAction::Reset => {
                *self = Self::default();
                Ok(Applied::Changed)
            }
            BatchAction::Clear(ids) => {
                for id in &ids {
                    self.forget(id);
                }
                Ok(Applied::Changed)
            }
            BatchAction::Record(result) => self.record(result),
            BatchAction::JobCompleted {
                public_id,
                job_id,
                urls,
            } => self.complete_job(&public_id, &job_id, urls),
            BatchAction::JobFailed {
                public_id,
                job_id,
                message,
            } => self.fail_job(&public_id, &job_id, message),
            BatchAction::Select { public_id, url } => self.select(public_id, url),
        }
    }

    // ---- private helpers ----

    fn forget(&mut self, public_id: &str) {
        self.previews.remove(public_id);
        self.selected.remove(public_id);
        self.failures.remove(public_id);
        self.jobs.retain(|j| j.public_id != public_id);
    }

    fn record(&mut self, result: ProcessingResult) -> Result<Applied, CoreError> {
        let id = result.original;

        if let Some(error) = result.error {
            self.forget(&id);
            self.failures.insert(id, error);
            return Ok(Applied::Changed);
        }

        if result.is_async {
            let job_id = result.job_id.ok_or_else(|| {
                CoreError::Validation(format!("Async result for {id} has no job id"))
            })?;
            if let Some(active) = self.active_job(&id) {
                return Err(CoreError::Conflict(format!(
                    "Image {id} already has active job {}",
                    active.job_id
                )));
            }
            self.forget(&id);
            self.jobs.push(ProcessingJob::registered(id, job_id));
            return Ok(Applied::Changed);
        }

        if result.previews.is_empty() {
            return Err(CoreError::Validation(format!(
                "Synchronous result for {id} has no previews"
            )));
        }
        self.forget(&id);
        self.set_previews(id, result.previews);
        Ok(Applied::Changed)
    }

    fn complete_job(
        &mut self,
        public_id: &str,
        job_id: &str,
        urls: Vec<String>,
    ) -> Result<Applied, CoreError> {
        if urls.is_empty() {
            return self.fail_job(public_id, job_id, MSG_NO_RESULT_URLS.to_string());
        }
        let Some(job) = self.pending_job_mut(public_id, job_id) else {
            return Ok(Applied::Ignored);
        };
        job.complete()?;
        self.set_previews(public_id.to_string(), urls);
        Ok(Applied::Changed)
    }

    fn fail_job(
        &mut self,
        public_id: &str,
        job_id: &str,
        message: String,
    ) -> Result<Applied, CoreError> {
        let Some(job) = self.pending_job_mut(public_id, job_id) else {
            return Ok(Applied::Ignored);
        };
        job.fail(message.clone())?;
        self.failures.insert(public_id.to_string(), message);
        Ok(Applied::Changed)
    }

    fn select(&mut self, public_id: PublicId, url: String) -> Result<Applied, CoreError> {
        let candidates = self.previews.get(&public_id).ok_or(CoreError::NotFound {
            entity: "previews",
            id: public_id.clone(),
        })?;
        if !candidates.contains(&url) {
            return Err(CoreError::Validation(format!(
                "{url} is not a preview of image {public_id}"
            )));
        }
        self.selected.insert(public_id, url);
        Ok(Applied::Changed)
    }

    fn pending_job_mut(&mut self, public_id: &str, job_id: &str) -> Option<&mut ProcessingJob> {
        self.jobs
            .iter_mut()
            .find(|j| j.public_id == public_id && j.job_id == job_id && !j.is_terminal())
    }

    /// Store candidates and auto-select the first one.
    fn set_previews(&mut self, public_id: PublicId, urls: Vec<String>) {
        if let Some(first) = urls.first() {
            self.selected.insert(public_id.clone(), first.clone());
        }
        self.previews.insert(public_id, urls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::replacement::{Classification, ResultSource};
    use assert_matches::assert_matches;

    fn sync_result(id: &str, urls: &[&str]) -> ProcessingResult {
        ProcessingResult::from_classification(
            id,
            Classification::Completed {
                urls: urls.iter().map(|u| u.to_string()).collect(),
            },
            ResultSource::Primary,
        )
    }

    fn async_result(id: &str, job_id: &str) -> ProcessingResult {
        ProcessingResult::from_classification(
            id,
            Classification::Processing {
                job_id: job_id.into(),
                preview_url: None,
            },
            ResultSource::Primary,
        )
    }

    fn completed(id: &str, job_id: &str, urls: &[&str]) -> BatchAction {
        BatchAction::JobCompleted {
            public_id: id.into(),
            job_id: job_id.into(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn failed(id: &str, job_id: &str, message: &str) -> BatchAction {
        BatchAction::JobFailed {
            public_id: id.into(),
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    // -- progress_percent -----------------------------------------------------

    #[test]
    fn progress_is_monotonic_and_ends_at_100() {
        let total = 7;
        let values: Vec<u8> = (0..total).map(|i| progress_percent(i, total)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100);
    }

    #[test]
    fn progress_for_three_images() {
        assert_eq!(progress_percent(0, 3), 33);
        assert_eq!(progress_percent(1, 3), 66);
        assert_eq!(progress_percent(2, 3), 100);
    }

    #[test]
    fn progress_of_empty_batch_is_complete() {
        assert_eq!(progress_percent(0, 0), 100);
    }

    // -- Record ---------------------------------------------------------------

    #[test]
    fn sync_result_auto_selects_first_candidate() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("img1", &["a.jpg", "a2.jpg"])))
            .unwrap();
        assert_eq!(state.previews()["img1"], vec!["a.jpg", "a2.jpg"]);
        assert_eq!(state.selected()["img1"], "a.jpg");
        assert!(state.is_done());
    }

    #[test]
    fn async_result_registers_processing_job() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img2", "job-2")))
            .unwrap();
        let job = state.active_job("img2").unwrap();
        assert_eq!(job.job_id, "job-2");
        assert_eq!(job.status, JobStatus::Processing);
        assert!(!state.is_done());
        assert!(state.previews().is_empty());
    }

    #[test]
    fn second_active_job_for_same_image_is_rejected() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img", "job-1")))
            .unwrap();
        let err = state
            .apply(BatchAction::Record(async_result("img", "job-2")))
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(state.jobs().len(), 1);
    }

    #[test]
    fn new_job_allowed_after_previous_one_finished() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img", "job-1")))
            .unwrap();
        state.apply(failed("img", "job-1", "boom")).unwrap();
        state
            .apply(BatchAction::Record(async_result("img", "job-2")))
            .unwrap();
        assert_eq!(state.jobs().len(), 1);
        assert_eq!(state.active_job("img").unwrap().job_id, "job-2");
        assert!(state.failures().is_empty());
    }

    #[test]
    fn failure_result_is_recorded() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(ProcessingResult::failure("img", "nope")))
            .unwrap();
        assert_eq!(state.failures()["img"], "nope");
        assert!(state.summary().all_failed());
    }

    #[test]
    fn sync_result_without_previews_is_invalid() {
        let mut state = BatchState::new();
        let result = sync_result("img", &[]);
        assert_matches!(
            state.apply(BatchAction::Record(result)),
            Err(CoreError::Validation(_))
        );
    }

    // -- Job callbacks --------------------------------------------------------

    #[test]
    fn job_completion_fills_previews() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img2", "job-2")))
            .unwrap();
        let applied = state.apply(completed("img2", "job-2", &["b.jpg"])).unwrap();
        assert_eq!(applied, Applied::Changed);
        assert_eq!(state.previews()["img2"], vec!["b.jpg"]);
        assert_eq!(state.selected()["img2"], "b.jpg");
        assert!(state.is_done());
    }

    #[test]
    fn duplicate_callbacks_are_ignored() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img", "job")))
            .unwrap();
        state.apply(completed("img", "job", &["x.jpg"])).unwrap();
        let again = state.apply(failed("img", "job", "late")).unwrap();
        assert_eq!(again, Applied::Ignored);
        assert!(state.failures().is_empty());
        assert_eq!(state.selected()["img"], "x.jpg");
    }

    #[test]
    fn callbacks_for_unknown_jobs_are_ignored() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img", "job-new")))
            .unwrap();
        let applied = state.apply(completed("img", "job-old", &["x.jpg"])).unwrap();
        assert_eq!(applied, Applied::Ignored);
        assert!(state.previews().is_empty());
    }

    #[test]
    fn completion_without_urls_fails_job() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(async_result("img", "job")))
            .unwrap();
        state.apply(completed("img", "job", &[])).unwrap();
        assert_eq!(state.failures()["img"], MSG_NO_RESULT_URLS);
        assert_eq!(state.jobs()[0].status, JobStatus::Failed);
    }

    #[test]
    fn interleaved_callbacks_all_land() {
        let mut state = BatchState::new();
        for (id, job) in [("a", "ja"), ("b", "jb"), ("c", "jc")] {
            state
                .apply(BatchAction::Record(async_result(id, job)))
                .unwrap();
        }
        state.apply(completed("c", "jc", &["c.jpg"])).unwrap();
        state.apply(failed("a", "ja", "bad")).unwrap();
        assert!(!state.is_done());
        state.apply(completed("b", "jb", &["b.jpg"])).unwrap();

        let summary = state.summary();
        assert!(state.is_done());
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                completed: 2,
                failed: 1,
                processing: 0
            }
        );
    }

    #[test]
    fn summary_for_counts_only_named_images() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("old", &["o.jpg"])))
            .unwrap();
        state
            .apply(BatchAction::Record(async_result("new", "job")))
            .unwrap();

        let ids = vec!["new".to_string(), "queued".to_string()];
        let summary = state.summary_for(&ids);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.processing, 1);
        assert_eq!(summary.completed, 0);
        assert!(!summary.is_done());
    }

    // -- Select ---------------------------------------------------------------

    #[test]
    fn select_switches_candidate() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("img", &["1.jpg", "2.jpg"])))
            .unwrap();
        state
            .apply(BatchAction::Select {
                public_id: "img".into(),
                url: "2.jpg".into(),
            })
            .unwrap();
        assert_eq!(state.selected()["img"], "2.jpg");
    }

    #[test]
    fn select_rejects_foreign_url() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("img", &["1.jpg"])))
            .unwrap();
        let err = state
            .apply(BatchAction::Select {
                public_id: "img".into(),
                url: "evil.jpg".into(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("is not a preview"));
        assert_eq!(state.selected()["img"], "1.jpg");
    }

    #[test]
    fn select_without_previews_is_not_found() {
        let mut state = BatchState::new();
        assert_matches!(
            state.apply(BatchAction::Select {
                public_id: "ghost".into(),
                url: "x".into(),
            }),
            Err(CoreError::NotFound { .. })
        );
    }

    // -- Clear / Reset --------------------------------------------------------

    #[test]
    fn clear_only_touches_named_images() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("keep", &["k.jpg"])))
            .unwrap();
        state
            .apply(BatchAction::Record(async_result("drop", "job")))
            .unwrap();
        state
            .apply(BatchAction::Clear(vec!["drop".into()]))
            .unwrap();
        assert!(state.jobs().is_empty());
        assert_eq!(state.selected()["keep"], "k.jpg");
    }

    #[test]
    fn reset_empties_everything() {
        let mut state = BatchState::new();
        state
            .apply(BatchAction::Record(sync_result("img", &["a.jpg"])))
            .unwrap();
        state.apply(BatchAction::Reset).unwrap();
        assert_eq!(state, BatchState::default());
    }
}

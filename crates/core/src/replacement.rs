//! Background-replacement wire types and response classification.
//!
//! The media routes answer a submission with either finished URLs
//! (`{"status":"completed","urls":[...]}`) or a job handle
//! (`{"status":"processing","jobId":"..."}`). Status queries answer with
//! `{"status":"completed"|"processing"|"failed","urls"?,"error"?}`.
//! Deserialization is lenient; [`classify`] and
//! [`JobStatusResponse::outcome`] decide what a body means.

use serde::{Deserialize, Serialize};

use crate::job::{MSG_NO_RESULT_URLS, MSG_PROCESSING_FAILED};
use crate::types::{JobId, PublicId};

/// Error recorded when a submission yields neither URLs nor a job handle.
pub const MSG_UNRECOGNIZED_RESPONSE: &str =
    "No preview images were generated or job status not recognized";

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of a submission to the primary or fallback route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRequest {
    pub public_id: PublicId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl ReplacementRequest {
    pub fn new(public_id: impl Into<PublicId>, prompt: impl Into<String>, seed: u32) -> Self {
        Self {
            public_id: public_id.into(),
            prompt: Some(prompt.into()),
            seed: Some(seed),
        }
    }
}

/// Response body of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Low-resolution preview some providers return with a job handle.
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl ReplacementResponse {
    pub fn completed(urls: Vec<String>) -> Self {
        Self {
            status: Some(STATUS_COMPLETED.into()),
            urls,
            ..Default::default()
        }
    }

    pub fn processing(job_id: impl Into<JobId>) -> Self {
        Self {
            status: Some(STATUS_PROCESSING.into()),
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    /// Error text carried in the body, with details appended when present.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match self.details.as_deref() {
            Some(details) if !details.is_empty() => format!("{error}: {details}"),
            _ => error.to_string(),
        })
    }
}

/// Response body of a job status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a single status query says about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Completed(Vec<String>),
    /// Reported completed but without any output.
    CompletedEmpty,
    Failed(String),
    /// Still running, or a status the client does not understand.
    Pending,
}

impl StatusOutcome {
    /// Terminal failure message for outcomes that end the job unsuccessfully.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::CompletedEmpty => Some(MSG_NO_RESULT_URLS),
            Self::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

impl JobStatusResponse {
    pub fn outcome(&self) -> StatusOutcome {
        match self.status.as_deref() {
            Some(STATUS_COMPLETED) if self.urls.is_empty() => StatusOutcome::CompletedEmpty,
            Some(STATUS_COMPLETED) => StatusOutcome::Completed(self.urls.clone()),
            Some(STATUS_FAILED) => StatusOutcome::Failed(
                self.error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| MSG_PROCESSING_FAILED.to_string()),
            ),
            _ => StatusOutcome::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Which provider produced a submission response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Primary,
    Fallback,
}

/// Meaning of a submission response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Completed { urls: Vec<String> },
    Processing {
        job_id: JobId,
        preview_url: Option<String>,
    },
    Unrecognized,
}

/// Classify a submission response by content: URLs win over a job
/// handle, and a body with neither is unrecognized.
pub fn classify(response: &ReplacementResponse) -> Classification {
    let urls: Vec<String> = response
        .urls
        .iter()
        .filter(|u| !u.trim().is_empty())
        .cloned()
        .collect();
    if !urls.is_empty() {
        return Classification::Completed { urls };
    }
    match response.job_id.as_deref() {
        Some(job_id) if !job_id.trim().is_empty() => Classification::Processing {
            job_id: job_id.to_string(),
            preview_url: response.preview_url.clone(),
        },
        _ => Classification::Unrecognized,
    }
}

// ---------------------------------------------------------------------------
// ProcessingResult
// ---------------------------------------------------------------------------

/// Outcome of submitting one image within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// `publicId` of the source image.
    pub original: PublicId,
    /// Candidate output URLs; empty while an async job is pending.
    pub previews: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Low-resolution preview offered while an async job runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub is_async: bool,
    /// Absent when submission failed before any provider answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResultSource>,
}

impl ProcessingResult {
    pub fn from_classification(
        original: impl Into<PublicId>,
        classification: Classification,
        source: ResultSource,
    ) -> Self {
        let original = original.into();
        match classification {
            Classification::Completed { urls } => Self {
                original,
                previews: urls,
                error: None,
                job_id: None,
                preview_url: None,
                is_async: false,
                source: Some(source),
            },
            Classification::Processing {
                job_id,
                preview_url,
            } => Self {
                original,
                previews: Vec::new(),
                error: None,
                job_id: Some(job_id),
                preview_url,
                is_async: true,
                source: Some(source),
            },
            Classification::Unrecognized => Self {
                original,
                previews: Vec::new(),
                error: Some(MSG_UNRECOGNIZED_RESPONSE.to_string()),
                job_id: None,
                preview_url: None,
                is_async: false,
                source: Some(source),
            },
        }
    }

    /// Result for an image whose submission failed outright.
    pub fn failure(original: impl Into<PublicId>, error: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            previews: Vec::new(),
            error: Some(error.into()),
            job_id: None,
            preview_url: None,
            is_async: false,
            source: None,
        }
    }

    /// Produced previews now or will once its job finishes.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && (self.is_async || !self.previews.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(json: &str) -> ReplacementResponse {
        serde_json::from_str(json).unwrap()
    }

    // -- classify -------------------------------------------------------------

    #[test]
    fn urls_classify_as_completed() {
        let response = parse(r#"{"status":"completed","urls":["a.jpg","b.jpg"]}"#);
        assert_eq!(
            classify(&response),
            Classification::Completed {
                urls: vec!["a.jpg".into(), "b.jpg".into()]
            }
        );
    }

    #[test]
    fn job_id_without_urls_classifies_as_processing() {
        let response =
            parse(r#"{"status":"processing","jobId":"job-2","previewUrl":"low.jpg"}"#);
        assert_eq!(
            classify(&response),
            Classification::Processing {
                job_id: "job-2".into(),
                preview_url: Some("low.jpg".into()),
            }
        );
    }

    #[test]
    fn urls_take_precedence_over_job_id() {
        let response = parse(r#"{"status":"processing","jobId":"j","urls":["x.jpg"]}"#);
        assert_matches!(classify(&response), Classification::Completed { .. });
    }

    #[test]
    fn blank_values_are_ignored() {
        let response = parse(r#"{"urls":["", "  "],"jobId":" "}"#);
        assert_eq!(classify(&response), Classification::Unrecognized);
    }

    #[test]
    fn empty_body_is_unrecognized() {
        assert_eq!(classify(&parse("{}")), Classification::Unrecognized);
    }

    // -- ProcessingResult -----------------------------------------------------

    #[test]
    fn completed_result_is_sync_and_usable() {
        let result = ProcessingResult::from_classification(
            "img1",
            Classification::Completed {
                urls: vec!["a.jpg".into()],
            },
            ResultSource::Primary,
        );
        assert!(!result.is_async);
        assert_eq!(result.previews, vec!["a.jpg".to_string()]);
        assert!(result.is_usable());
    }

    #[test]
    fn processing_result_is_async_with_empty_previews() {
        let result = ProcessingResult::from_classification(
            "img2",
            Classification::Processing {
                job_id: "job-2".into(),
                preview_url: None,
            },
            ResultSource::Fallback,
        );
        assert!(result.is_async);
        assert!(result.previews.is_empty());
        assert_eq!(result.job_id.as_deref(), Some("job-2"));
        assert_eq!(result.source, Some(ResultSource::Fallback));
        assert!(result.is_usable());
    }

    #[test]
    fn processing_result_keeps_preview_url() {
        let response = parse(r#"{"status": "processing", "jobId": "job-2", "previewUrl": "low.jpg"}"#);
        let result = ProcessingResult::from_classification(
            "img2",
            classify(&response),
            ResultSource::Primary,
        );
        assert_eq!(result.preview_url.as_deref(), Some("low.jpg"));
        assert!(result.is_async);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["previewUrl"], "low.jpg");
    }

    #[test]
    fn unrecognized_result_carries_error() {
        let result = ProcessingResult::from_classification(
            "img3",
            Classification::Unrecognized,
            ResultSource::Primary,
        );
        assert_eq!(result.error.as_deref(), Some(MSG_UNRECOGNIZED_RESPONSE));
        assert!(!result.is_usable());
    }

    #[test]
    fn failure_result_has_no_source() {
        let result = ProcessingResult::failure("img", "timeout");
        assert!(result.source.is_none());
        assert!(!result.is_usable());
    }

    // -- JobStatusResponse ----------------------------------------------------

    #[test]
    fn status_outcomes() {
        let completed: JobStatusResponse =
            serde_json::from_str(r#"{"status":"completed","urls":["b.jpg"]}"#).unwrap();
        assert_eq!(
            completed.outcome(),
            StatusOutcome::Completed(vec!["b.jpg".into()])
        );

        let empty: JobStatusResponse =
            serde_json::from_str(r#"{"status":"completed","urls":[]}"#).unwrap();
        assert_eq!(empty.outcome(), StatusOutcome::CompletedEmpty);
        assert_eq!(empty.outcome().failure_message(), Some(MSG_NO_RESULT_URLS));

        let failed: JobStatusResponse =
            serde_json::from_str(r#"{"status":"failed","error":"GPU exploded"}"#).unwrap();
        assert_eq!(failed.outcome(), StatusOutcome::Failed("GPU exploded".into()));

        let processing: JobStatusResponse =
            serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert_eq!(processing.outcome(), StatusOutcome::Pending);
    }

    #[test]
    fn failed_status_without_message_gets_default() {
        let failed: JobStatusResponse = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert_eq!(
            failed.outcome(),
            StatusOutcome::Failed(MSG_PROCESSING_FAILED.into())
        );
    }

    #[test]
    fn unknown_status_keeps_polling() {
        let odd: JobStatusResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(odd.outcome(), StatusOutcome::Pending);
        assert_eq!(JobStatusResponse::default().outcome(), StatusOutcome::Pending);
    }

    // -- ReplacementRequest / Response -----------------------------------------

    #[test]
    fn request_serializes_camel_case() {
        let json = serde_json::to_value(ReplacementRequest::new("cars/1", "beach", 7)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"publicId": "cars/1", "prompt": "beach", "seed": 7})
        );
    }

    #[test]
    fn error_message_appends_details() {
        let response = parse(r#"{"error":"Upstream failed","details":"quota exceeded"}"#);
        assert_eq!(
            response.error_message().as_deref(),
            Some("Upstream failed: quota exceeded")
        );
        assert_eq!(parse("{}").error_message(), None);
    }
}

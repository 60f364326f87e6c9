//! Completion events published by document workers.
//!
//! The JSON field names are a compatibility boundary shared with every
//! worker deployment: events already in flight on the broker were written
//! against this exact shape, so renaming a field breaks them.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, UserId};

/// Outcome of a background document job, addressed to a single user.
///
/// The consumer only deserializes this to learn the addressee; the raw
/// bytes read off the broker are what gets forwarded to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub user_id: UserId,
    pub job_id: JobId,
    pub success: bool,
    /// `"resume"` or `"cover-letter"`. Workers may omit it on failure.
    #[serde(default)]
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionEvent {
    /// Parse an event from the raw broker payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Successful completion with a download link.
    pub fn succeeded(
        user_id: impl Into<UserId>,
        job_id: JobId,
        document_type: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            job_id,
            success: true,
            document_type: document_type.into(),
            download_url: Some(download_url.into()),
            changes_url: None,
            error: None,
        }
    }

    /// Failed completion carrying the worker's error message.
    pub fn failed(
        user_id: impl Into<UserId>,
        job_id: JobId,
        document_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            job_id,
            success: false,
            document_type: document_type.into(),
            download_url: None,
            changes_url: None,
            error: Some(error.into()),
        }
    }

    /// Attach the URL of the change-log JSON produced alongside the PDF.
    pub fn with_changes_url(mut self, url: impl Into<String>) -> Self {
        self.changes_url = Some(url.into());
        self
    }
}

//! Document generation requests handed to workers over the broker.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, UserId};

/// Kind of document a worker should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Resume,
    CoverLetter,
}

impl DocumentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::CoverLetter => "cover-letter",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document generation job.
///
/// Field names follow the worker's request schema (`jobID`, `userID`,
/// camelCase elsewhere). The structured sections are carried as opaque
/// JSON; their shape belongs to the rendering side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "companyName")]
    pub company_name: String,
    #[serde(rename = "docType")]
    pub doc_type: DocumentType,
    #[serde(rename = "userInfo")]
    pub user_info: serde_json::Value,
    #[serde(rename = "educationInfo")]
    pub education_info: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<serde_json::Value>,
    #[serde(
        rename = "coverLetter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_letter: Option<serde_json::Value>,
}

impl JobRequest {
    /// Start a request with empty structured sections.
    pub fn new(job_id: JobId, user_id: impl Into<UserId>, doc_type: DocumentType) -> Self {
        Self {
            job_id,
            user_id: user_id.into(),
            company_name: String::new(),
            doc_type,
            user_info: serde_json::Value::Object(Default::default()),
            education_info: serde_json::Value::Object(Default::default()),
            resume: None,
            cover_letter: None,
        }
    }

    pub fn with_company(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = company_name.into();
        self
    }

    pub fn with_resume(mut self, resume: serde_json::Value) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn with_cover_letter(mut self, cover_letter: serde_json::Value) -> Self {
        self.cover_letter = Some(cover_letter);
        self
    }

    /// Broker partition key: the job id in decimal.
    ///
    /// All messages for one job land on the same partition, so they stay
    /// ordered relative to each other. Nothing orders distinct jobs.
    pub fn partition_key(&self) -> String {
        self.job_id.to_string()
    }

    /// Reject requests a worker could never process.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.job_id <= 0 {
            return Err(CoreError::Validation(format!(
                "job id must be positive, got {}",
                self.job_id
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(CoreError::Validation("user id must not be empty".into()));
        }
        Ok(())
    }

    /// Serialize to the JSON bytes published on the broker.
    pub fn to_payload(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use meritum_core::types::JobId;
use meritum_core::{DocumentType, JobRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/documents/queue`.
///
/// The user id is never taken from the body; it comes from the token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDocumentRequest {
    pub job_id: JobId,
    pub doc_type: DocumentType,
    #[serde(default)]
    pub company_name: String,
    #[serde(default = "empty_object")]
    pub user_info: Value,
    #[serde(default = "empty_object")]
    pub education_info: Value,
    #[serde(default)]
    pub resume: Option<Value>,
    #[serde(default)]
    pub cover_letter: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl QueueDocumentRequest {
    fn into_job_request(self, user_id: String) -> JobRequest {
        let mut request = JobRequest::new(self.job_id, user_id, self.doc_type)
            .with_company(self.company_name);
        request.user_info = self.user_info;
        request.education_info = self.education_info;
        if let Some(resume) = self.resume {
            request = request.with_resume(resume);
        }
        if let Some(cover_letter) = self.cover_letter {
            request = request.with_cover_letter(cover_letter);
        }
        request
    }
}

#[derive(Debug, Serialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub doc_type: DocumentType,
}

/// Publish a document job for the workers.
///
/// Returns 202 once the broker has accepted the job. The result arrives
/// later over the user's WebSocket.
pub async fn queue_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<QueueDocumentRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<QueuedJob>>)> {
    let request = body.into_job_request(auth.user_id);
    request.validate()?;

    state.producer.enqueue(&request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: QueuedJob {
                job_id: request.job_id,
                doc_type: request.doc_type,
            },
        }),
    ))
}

//! Document job submission.
//!
//! ```text
//! POST /documents/queue    queue_document
//! ```

use axum::routing::post;
use axum::Router;

use crate::handlers::documents;
use crate::state::AppState;

/// Routes mounted at `/documents`.
pub fn router() -> Router<AppState> {
    Router::new().route("/queue", post(documents::queue_document))
}

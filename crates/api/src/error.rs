use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meritum_core::CoreError;
use meritum_events::ProducerError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`ProducerError`] for broker
/// failures.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `meritum_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The job broker could not accept a publish.
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// 401 with the given reason.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Core(CoreError::Unauthorized(reason.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Unauthorized(_) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", core.to_string())
                }
                CoreError::Serialization(err) => {
                    tracing::error!(error = %err, "Serialization error");
                    internal()
                }
            },

            // --- Broker errors ---
            AppError::Producer(ProducerError::Encode(err)) => {
                tracing::error!(error = %err, "Failed to encode job request");
                internal()
            }
            AppError::Producer(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BROKER_UNAVAILABLE",
                format!("Job queue unavailable, try again later ({err})"),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritum_events::BrokerError;
    use std::time::Duration;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = AppError::unauthorized("No token provided").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn broker_failures_map_to_503() {
        let offline = AppError::from(ProducerError::Broker(BrokerError::Unavailable("down".into())));
        assert_eq!(offline.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = AppError::from(ProducerError::Timeout(Duration::from_secs(10)));
        assert_eq!(timeout.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = AppError::from(CoreError::Validation("job_id must be positive".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn serialization_maps_to_500() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AppError::from(CoreError::from(json_err));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use hazardwatch_common::HazardError;

/// Local wrapper around `HazardError` — `IntoResponse` is a foreign trait
/// and `HazardError` a foreign type, so this crate needs its own type to
/// implement the conversion on.
pub struct ApiError(pub HazardError);

impl From<HazardError> for ApiError {
    fn from(err: HazardError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            HazardError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HazardError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            HazardError::Malformed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            HazardError::TransientStorage(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            HazardError::SubscriberGone => {
                (StatusCode::GONE, "subscriber gone".to_string())
            }
            HazardError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal storage error".to_string())
            }
            HazardError::Other(err) => {
                tracing::error!(error = %err, "unexpected error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

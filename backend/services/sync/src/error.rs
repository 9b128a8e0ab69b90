use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::scheduler::TriggerError;

pub enum ApiError {
    Trigger(TriggerError),
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        Self::Trigger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Trigger(err @ TriggerError::QueueFull) => {
                (StatusCode::TOO_MANY_REQUESTS, err.to_string())
            }
            ApiError::Trigger(err @ TriggerError::ShuttingDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_too_many_requests() {
        let resp = ApiError::from(TriggerError::QueueFull).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn shutting_down_is_unavailable() {
        let resp = ApiError::from(TriggerError::ShuttingDown).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

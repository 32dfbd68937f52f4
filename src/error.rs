use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

// Define our custom error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    BadRequest(String),
    NotFound(String),
    /// File requested before the download finished; carries the current
    /// status so the client knows to keep polling.
    NotReady(String),
}

// This implementation allows us to convert our AppError into a valid HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Internal(e) => {
                // Log the full error for debugging
                tracing::error!("Internal server error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, json!({ "error": e })),
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, json!({ "error": e })),
            AppError::NotReady(status) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Download not completed", "status": status }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

// This allows us to use the `?` operator to automatically convert
// any error that implements `std::error::Error` into our `AppError::Internal`.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

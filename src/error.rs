use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type.
///
/// Variants used on the signaling HTTP path map to the `{code:-1, error:<msg>}` / 500
/// contract via [`IntoResponse`]. Variants raised inside the media plane (ingest, fan-out,
/// cleanup) are never surfaced through this type to an HTTP caller — they are logged and
/// swallowed at the point they occur, per the lossy-tolerant error policy.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid SDP offer: {0}")]
    InvalidOffer(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signaling error response body: `{code:-1, error:<message>}`.
#[derive(Serialize)]
struct ErrorBody {
    code: i32,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        tracing::error!(error = %message, "signaling request failed");

        let body = ErrorBody {
            code: -1,
            error: message,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

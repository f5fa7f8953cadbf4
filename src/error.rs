use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("restaurant search failed: {0}")]
    Search(String),
    #[error("no restaurant found with a phone number")]
    NoRestaurant,
    #[error("failed to initiate call: {0}")]
    Dial(String),
    #[error("telephony provider error: {0}")]
    Provider(String),
    /// Media socket misbehaved: no start frame, garbage, or an early close.
    #[error("{0}")]
    Protocol(&'static str),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::NoRestaurant => StatusCode::NOT_FOUND,
            AppError::Search(_)
            | AppError::Dial(_)
            | AppError::Provider(_)
            | AppError::Protocol(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error=%self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn handle_error(e: impl std::error::Error) {
    error!("ERROR: {e}")
}

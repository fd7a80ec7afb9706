//! Error taxonomy for the authentication flows.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::users::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown email, wrong password or an account without a password.
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("User already exists")]
    DuplicateEmail,

    /// Lost a create race on the same external id. Resolved by retrying the lookup.
    #[error("duplicate external identity")]
    DuplicateIdentity,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("identity provider error: {0}")]
    UpstreamProvider(String),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::DuplicateExternalId => Self::DuplicateIdentity,
            other => Self::Store(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::DuplicateEmail | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamProvider(_) => StatusCode::BAD_GATEWAY,
            Self::DuplicateIdentity | Self::Session(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::UpstreamProvider(_) => "External provider error".to_string(),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

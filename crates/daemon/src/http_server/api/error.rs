use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use service::{ErrorKind, VaultError};

/// Everything a v0 handler can fail with
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("missing x-anchor-identity header")]
    MissingIdentity,
    #[error("invalid x-anchor-identity header: {0}")]
    InvalidIdentity(String),
    #[error("invalid file id: {0}")]
    InvalidFileId(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl HandlerError {
    fn code(&self) -> &'static str {
        match self {
            HandlerError::Vault(e) => e.kind().code(),
            HandlerError::MissingIdentity | HandlerError::InvalidIdentity(_) => "invalid_identity",
            HandlerError::InvalidFileId(_) | HandlerError::InvalidAddress(_) => "invalid_request",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HandlerError::Vault(e) => status_for(e.kind()),
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AccessDenied | ErrorKind::LedgerUnauthorized => StatusCode::FORBIDDEN,
        ErrorKind::EscrowNotFound => StatusCode::NOT_FOUND,
        ErrorKind::EscrowOrphaned | ErrorKind::LedgerRejected => StatusCode::CONFLICT,
        ErrorKind::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::DecodeMismatch
        | ErrorKind::DecryptionIntegrityFailure
        | ErrorKind::EncryptionFailure
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        } else {
            tracing::debug!(code = self.code(), "request rejected: {}", self);
        }

        let body = serde_json::json!({
            "code": self.code(),
            "msg": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

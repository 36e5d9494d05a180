use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    /// The daemon refused the request with a vault error code
    #[error("{msg} ({code}, HTTP {status})")]
    Vault {
        status: StatusCode,
        code: String,
        msg: String,
    },
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    msg: String,
}

impl ApiError {
    /// Classify a non-success response body
    pub(crate) fn from_response(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(ErrorBody { code, msg }) => ApiError::Vault { status, code, msg },
            Err(_) => ApiError::HttpStatus(status, body),
        }
    }

    /// The daemon's machine-readable error code, if it sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Vault { code, .. } => Some(code),
            _ => None,
        }
    }
}

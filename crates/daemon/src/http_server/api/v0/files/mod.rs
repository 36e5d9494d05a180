use axum::routing::{get, post};
use axum::Router;

use common::types::FileId;

use crate::http_server::api::HandlerError;
use crate::ServiceState;

pub mod archive;
pub mod escrow;
pub mod recover;
pub mod upload;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(upload::handler))
        .route("/:file_id", get(recover::handler))
        .route("/:file_id/archive", post(archive::handler))
        .route("/:file_id/escrow", get(escrow::handler))
        .with_state(state)
}

pub(crate) fn parse_file_id(raw: &str) -> Result<FileId, HandlerError> {
    raw.parse()
        .map_err(|e: common::types::ParseError| HandlerError::InvalidFileId(e.to_string()))
}

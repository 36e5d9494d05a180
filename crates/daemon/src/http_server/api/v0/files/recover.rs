use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};

use common::types::{Address, FileId};

use super::parse_file_id;
use crate::http_server::api::{HandlerError, Identity, IDENTITY_HEADER};
use crate::ServiceState;

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(requester): Identity,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let file_id = parse_file_id(&file_id)?;
    let plaintext = state.vault().recover(&file_id, requester).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        plaintext,
    ))
}

/// Client side of `GET /api/v0/files/{file_id}`
#[derive(Debug, Clone)]
pub struct RecoverRequest {
    pub file_id: FileId,
    pub requester: Address,
}

impl RecoverRequest {
    pub fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/v0/files/{}", self.file_id))?;
        Ok(client
            .get(full_url)
            .header(IDENTITY_HEADER, self.requester.to_hex()))
    }
}

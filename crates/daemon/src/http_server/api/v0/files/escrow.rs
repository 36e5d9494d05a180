use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};

use common::types::FileId;
use service::EscrowView;

use super::parse_file_id;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::HandlerError;
use crate::ServiceState;

/// Where a file's ciphertext lives and which transaction anchors it.
/// Never includes key material.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let file_id = parse_file_id(&file_id)?;
    let view = state.vault().escrow_view(&file_id).await?;
    Ok(Json(view))
}

#[derive(Debug, Clone)]
pub struct EscrowRequest {
    pub file_id: FileId,
}

impl ApiRequest for EscrowRequest {
    type Response = EscrowView;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/v0/files/{}/escrow", self.file_id))?;
        Ok(client.get(full_url))
    }
}

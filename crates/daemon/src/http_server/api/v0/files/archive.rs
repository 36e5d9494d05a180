use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::types::{Address, FileId, TxReference};

use super::parse_file_id;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{HandlerError, Identity, IDENTITY_HEADER};
use crate::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResponse {
    pub file_id: FileId,
    pub tx_reference: TxReference,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(from): Identity,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let file_id = parse_file_id(&file_id)?;
    let tx_reference = state.vault().archive(&file_id, from).await?;
    Ok(Json(ArchiveResponse {
        file_id,
        tx_reference,
    }))
}

/// Client side of `POST /api/v0/files/{file_id}/archive`
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub file_id: FileId,
    pub requester: Address,
}

impl ApiRequest for ArchiveRequest {
    type Response = ArchiveResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/v0/files/{}/archive", self.file_id))?;
        Ok(client
            .post(full_url)
            .header(IDENTITY_HEADER, self.requester.to_hex()))
    }
}

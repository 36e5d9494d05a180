use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::types::{Address, Priority};
use service::{EscrowStatus, UploadReceipt, UploadRequest};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{HandlerError, Identity, IDENTITY_HEADER};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadQuery {
    /// Display name recorded on the ledger
    pub name: String,
    pub priority: Priority,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Identity(uploader): Identity,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, HandlerError> {
    tracing::info!(
        %uploader,
        file_name = %query.name,
        priority = %query.priority,
        size = body.len(),
        "upload requested"
    );

    let receipt = state
        .vault()
        .upload(UploadRequest::new(query.name, uploader, query.priority, body))
        .await?;

    let status = match receipt.status {
        EscrowStatus::Active => StatusCode::CREATED,
        EscrowStatus::Pending => StatusCode::ACCEPTED,
        EscrowStatus::Orphaned | EscrowStatus::Revoked => StatusCode::CONFLICT,
    };
    Ok((status, Json(receipt)))
}

/// Client side of `POST /api/v0/files`
#[derive(Debug, Clone)]
pub struct UploadFileRequest {
    pub uploader: Address,
    pub file_name: String,
    pub priority: Priority,
    pub content: Bytes,
}

impl ApiRequest for UploadFileRequest {
    type Response = UploadReceipt;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/files")?;
        let query = UploadQuery {
            name: self.file_name,
            priority: self.priority,
        };
        Ok(client
            .post(full_url)
            .query(&query)
            .header(IDENTITY_HEADER, self.uploader.to_hex())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(self.content))
    }
}

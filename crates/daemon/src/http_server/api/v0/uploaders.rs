use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::types::{Address, TxReference};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{HandlerError, Identity, IDENTITY_HEADER};
use crate::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderStatus {
    pub uploader: Address,
    pub is_uploader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderChange {
    pub uploader: Address,
    pub tx_reference: TxReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddUploaderBody {
    pub uploader: Address,
}

fn parse_address(raw: &str) -> Result<Address, HandlerError> {
    raw.parse()
        .map_err(|e: common::types::ParseError| HandlerError::InvalidAddress(e.to_string()))
}

pub async fn check_handler(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let uploader = parse_address(&address)?;
    let is_uploader = state.vault().is_uploader(&uploader).await?;
    Ok(Json(UploaderStatus {
        uploader,
        is_uploader,
    }))
}

/// Whitelist an uploader; the caller must be the ledger owner
pub async fn add_handler(
    State(state): State<ServiceState>,
    Identity(from): Identity,
    Json(body): Json<AddUploaderBody>,
) -> Result<impl IntoResponse, HandlerError> {
    let tx_reference = state.vault().add_uploader(from, body.uploader).await?;
    tracing::info!(%from, uploader = %body.uploader, %tx_reference, "uploader added");
    Ok(Json(UploaderChange {
        uploader: body.uploader,
        tx_reference,
    }))
}

pub async fn remove_handler(
    State(state): State<ServiceState>,
    Identity(from): Identity,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let uploader = parse_address(&address)?;
    let tx_reference = state.vault().remove_uploader(from, uploader).await?;
    tracing::info!(%from, %uploader, %tx_reference, "uploader removed");
    Ok(Json(UploaderChange {
        uploader,
        tx_reference,
    }))
}

/// Client side of `GET /api/v0/uploaders/{address}`
#[derive(Debug, Clone)]
pub struct CheckUploaderRequest {
    pub uploader: Address,
}

impl ApiRequest for CheckUploaderRequest {
    type Response = UploaderStatus;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/v0/uploaders/{}", self.uploader))?;
        Ok(client.get(full_url))
    }
}

/// Client side of `POST /api/v0/uploaders`
#[derive(Debug, Clone)]
pub struct AddUploaderRequest {
    pub from: Address,
    pub uploader: Address,
}

impl ApiRequest for AddUploaderRequest {
    type Response = UploaderChange;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/uploaders")?;
        Ok(client
            .post(full_url)
            .header(IDENTITY_HEADER, self.from.to_hex())
            .json(&AddUploaderBody {
                uploader: self.uploader,
            }))
    }
}

/// Client side of `DELETE /api/v0/uploaders/{address}`
#[derive(Debug, Clone)]
pub struct RemoveUploaderRequest {
    pub from: Address,
    pub uploader: Address,
}

impl ApiRequest for RemoveUploaderRequest {
    type Response = UploaderChange;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/v0/uploaders/{}", self.uploader))?;
        Ok(client
            .delete(full_url)
            .header(IDENTITY_HEADER, self.from.to_hex()))
    }
}

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};

use service::ReconcileReport;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::HandlerError;
use crate::ServiceState;

/// Run one reconciliation pass now, outside the background schedule
pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, HandlerError> {
    let report = state.vault().reconcile().await?;
    tracing::info!(
        examined = report.examined,
        activated = report.activated.len(),
        orphaned = report.orphaned.len(),
        "on-demand reconciliation finished"
    );
    Ok(Json(report))
}

#[derive(Debug, Clone)]
pub struct ReconcileRequest;

impl ApiRequest for ReconcileRequest {
    type Response = ReconcileReport;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/reconcile")?;
        Ok(client.post(full_url))
    }
}

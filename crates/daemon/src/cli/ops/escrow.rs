use clap::Args;

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::files::escrow::EscrowRequest;
use common::types::FileId;

#[derive(Args, Debug, Clone)]
pub struct Escrow {
    pub file_id: FileId,
}

#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Escrow {
    type Error = EscrowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let view = ctx
            .client
            .call(EscrowRequest {
                file_id: self.file_id,
            })
            .await?;

        let provenance = view
            .provenance_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let transaction = view
            .tx_reference
            .map(|tx| tx.to_string())
            .unwrap_or_else(|| "-".to_string());

        Ok(format!(
            "{} ({})\n\
             - Owner: {}\n\
             - Priority: {}\n\
             - Status: {}\n\
             - Algorithm: {}\n\
             - Nonce: {}\n\
             - Blob: {}\n\
             - Transaction: {}\n\
             - Provenance ID: {}",
            view.file_name,
            view.file_id,
            view.owner_uploader,
            view.priority,
            view.status,
            view.algorithm.as_str(),
            view.nonce,
            view.blob_locator.as_str(),
            transaction,
            provenance,
        ))
    }
}

use clap::Args;

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::files::archive::ArchiveRequest;
use common::types::{Address, FileId};

#[derive(Args, Debug, Clone)]
pub struct Archive {
    pub file_id: FileId,

    /// The original uploader or the ledger owner
    #[arg(long)]
    pub requester: Address,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Archive {
    type Error = ArchiveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx
            .client
            .call(ArchiveRequest {
                file_id: self.file_id,
                requester: self.requester,
            })
            .await?;
        Ok(format!(
            "Archived {} (transaction {})",
            response.file_id, response.tx_reference
        ))
    }
}

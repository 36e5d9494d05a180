use std::path::PathBuf;

use clap::Args;

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::files::recover::RecoverRequest;
use common::types::{Address, FileId};

#[derive(Args, Debug, Clone)]
pub struct Recover {
    /// File to recover
    pub file_id: FileId,

    /// Identity the access policy is checked against
    #[arg(long)]
    pub requester: Address,

    /// Where to write the plaintext
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum RecoverError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Recover {
    type Error = RecoverError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let plaintext = ctx
            .client
            .recover(RecoverRequest {
                file_id: self.file_id,
                requester: self.requester,
            })
            .await?;

        tokio::fs::write(&self.out, &plaintext)
            .await
            .map_err(|source| RecoverError::Write {
                path: self.out.clone(),
                source,
            })?;

        Ok(format!(
            "Recovered {} ({} bytes) to {}",
            self.file_id,
            plaintext.len(),
            self.out.display()
        ))
    }
}

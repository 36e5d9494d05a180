use std::path::PathBuf;

use clap::Args;

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::files::upload::UploadFileRequest;
use common::types::{Address, Priority};

#[derive(Args, Debug, Clone)]
pub struct Upload {
    /// Document to upload
    pub path: PathBuf,

    /// Whitelisted uploader identity
    #[arg(long)]
    pub uploader: Address,

    /// Priority tier: 1 (user), 2 (admin) or 3 (super admin)
    #[arg(long, default_value = "1")]
    pub priority: Priority,

    /// Name recorded on the ledger (defaults to the file name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot derive a name from {0}, pass --name")]
    NoName(PathBuf),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Upload {
    type Error = UploadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let file_name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| UploadError::NoName(self.path.clone()))?,
        };

        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| UploadError::Read {
                path: self.path.clone(),
                source,
            })?;
        let size = content.len();

        let receipt = ctx
            .client
            .call(UploadFileRequest {
                uploader: self.uploader,
                file_name,
                priority: self.priority,
                content: content.into(),
            })
            .await?;

        let provenance = receipt
            .provenance_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(not yet confirmed)".to_string());

        Ok(format!(
            "Uploaded {} ({} bytes)\n\
             - File ID: {}\n\
             - Status: {}\n\
             - Transaction: {}\n\
             - Provenance ID: {}\n\
             - Blob: {}",
            receipt.file_name,
            size,
            receipt.file_id,
            receipt.status,
            receipt.tx_reference,
            provenance,
            receipt.blob_locator.as_str(),
        ))
    }
}

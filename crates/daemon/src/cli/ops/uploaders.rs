use clap::{Args, Subcommand};

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::uploaders::{
    AddUploaderRequest, CheckUploaderRequest, RemoveUploaderRequest,
};
use common::types::Address;

use crate::cli::op::Op;

#[derive(Args, Debug, Clone)]
pub struct Add {
    pub uploader: Address,

    /// The ledger owner
    #[arg(long)]
    pub from: Address,
}

#[derive(Args, Debug, Clone)]
pub struct Remove {
    pub uploader: Address,

    /// The ledger owner
    #[arg(long)]
    pub from: Address,
}

#[derive(Args, Debug, Clone)]
pub struct Check {
    pub uploader: Address,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadersError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Add {
    type Error = UploadersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let change = ctx
            .client
            .call(AddUploaderRequest {
                from: self.from,
                uploader: self.uploader,
            })
            .await?;
        Ok(format!(
            "Whitelisted {} (transaction {})",
            change.uploader, change.tx_reference
        ))
    }
}

#[async_trait::async_trait]
impl Op for Remove {
    type Error = UploadersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let change = ctx
            .client
            .call(RemoveUploaderRequest {
                from: self.from,
                uploader: self.uploader,
            })
            .await?;
        Ok(format!(
            "Removed {} from the whitelist (transaction {})",
            change.uploader, change.tx_reference
        ))
    }
}

#[async_trait::async_trait]
impl Op for Check {
    type Error = UploadersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let status = ctx
            .client
            .call(CheckUploaderRequest {
                uploader: self.uploader,
            })
            .await?;
        let verdict = if status.is_uploader { "is" } else { "is not" };
        Ok(format!("{} {} a whitelisted uploader", status.uploader, verdict))
    }
}

crate::command_enum! {
    (Add, Add),
    (Remove, Remove),
    (Check, Check),
}

pub type UploadersCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Uploaders {
    #[command(subcommand)]
    pub command: UploadersCommand,
}

#[async_trait::async_trait]
impl Op for Uploaders {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

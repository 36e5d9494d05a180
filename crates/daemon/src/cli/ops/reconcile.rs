use clap::Args;

use anchor_daemon::http_server::api::client::ApiError;
use anchor_daemon::http_server::api::v0::reconcile::ReconcileRequest;

#[derive(Args, Debug, Clone)]
pub struct Reconcile;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Reconcile {
    type Error = ReconcileError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let report = ctx.client.call(ReconcileRequest).await?;

        let mut lines = vec![format!("Examined {} pending file(s)", report.examined)];
        for (label, ids) in [
            ("activated", &report.activated),
            ("orphaned", &report.orphaned),
            ("still pending", &report.still_pending),
            ("errored", &report.errors),
            ("awaiting manual reconciliation", &report.needs_review),
        ] {
            if ids.is_empty() {
                continue;
            }
            lines.push(format!("  {}: {}", label, ids.len()));
            for id in ids {
                lines.push(format!("    {}", id));
            }
        }
        Ok(lines.join("\n"))
    }
}

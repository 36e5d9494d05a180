//! Resolution of escrow rows whose ledger registration is unconfirmed
//!
//! A row enters escrow as `pending` just before its registration is
//!  submitted, and picks up the transaction reference once the ledger has
//!  accepted it. A row that never got one was never anchored and is left
//!  for the stale sweep to orphan. Whoever next looks at the ledger (the upload pipeline while
//!  it waits, a recovery that finds the row pending, or the periodic
//!  reconciler) settles it through [`settle_pending`]. Status changes are
//!  compare-and-set, so these callers can race freely.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use common::ledger::Ledger;
use common::types::{FileId, ProvenanceId};

use crate::database::{Database, EscrowError, EscrowRecord, EscrowStatus};
use crate::error::VaultError;
use crate::retry::RetryPolicy;

/// Where a pending row stands after one look at the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Active(ProvenanceId),
    Orphaned,
    /// No receipt yet
    Pending,
    Revoked,
}

/// Poll the receipt of a pending row once and record the outcome
pub(crate) async fn settle_pending(
    db: &Database,
    ledger: &dyn Ledger,
    retry: &RetryPolicy,
    escrow: &EscrowRecord,
) -> Result<Resolution, VaultError> {
    let file_id = escrow.file_id;
    let Some(ledger_tx) = escrow.ledger_tx else {
        return Ok(Resolution::Pending);
    };
    let receipt = retry
        .run("receipt", || ledger.receipt(&ledger_tx))
        .await
        .map_err(|e| VaultError::from_ledger(e.error, e.attempts))?;

    let Some(receipt) = receipt else {
        return Ok(Resolution::Pending);
    };

    let outcome = match receipt.registered_id() {
        Some(provenance_id) => db.mark_active(&file_id, &provenance_id).await,
        None => {
            tracing::warn!(
                %file_id,
                tx = %ledger_tx,
                status = ?receipt.status,
                "registration did not anchor a record, orphaning escrow"
            );
            db.mark_orphaned(&file_id).await
        }
    };

    match outcome {
        Ok(_) => {}
        // someone else settled it first
        Err(EscrowError::InvalidTransition { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    current_resolution(db, &file_id).await
}

async fn current_resolution(db: &Database, file_id: &FileId) -> Result<Resolution, VaultError> {
    let escrow = db.get_escrow(file_id).await?;
    Ok(match (escrow.status, escrow.provenance_id) {
        (EscrowStatus::Active, Some(id)) => Resolution::Active(id),
        (EscrowStatus::Active, None) => {
            return Err(VaultError::Database(EscrowError::Corrupt(format!(
                "active escrow for {} has no provenance id",
                file_id
            ))))
        }
        (EscrowStatus::Orphaned, _) => Resolution::Orphaned,
        (EscrowStatus::Pending, _) => Resolution::Pending,
        (EscrowStatus::Revoked, _) => Resolution::Revoked,
    })
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub activated: Vec<FileId>,
    pub orphaned: Vec<FileId>,
    pub still_pending: Vec<FileId>,
    /// Rows that could not be examined this pass (ledger or database
    ///  unavailable); they are left pending
    pub errors: Vec<FileId>,
    /// Every orphaned row after this pass, oldest first. These need manual
    ///  reconciliation.
    #[serde(default)]
    pub needs_review: Vec<FileId>,
}

/// Settles pending escrow rows against the ledger
///
/// Rows still unconfirmed after `stale_after` are orphaned. Orphaned rows
///  and their ciphertext are never deleted.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
    ledger: Arc<dyn Ledger>,
    retry: RetryPolicy,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        db: Database,
        ledger: Arc<dyn Ledger>,
        retry: RetryPolicy,
        stale_after: Duration,
    ) -> Self {
        Self {
            db,
            ledger,
            retry,
            stale_after,
        }
    }

    pub async fn run_once(&self) -> Result<ReconcileReport, VaultError> {
        let pending = self.db.list_escrow_by_status(EscrowStatus::Pending).await?;
        let mut report = ReconcileReport {
            examined: pending.len(),
            ..Default::default()
        };

        for escrow in pending {
            let file_id = escrow.file_id;
            let resolution =
                match settle_pending(&self.db, self.ledger.as_ref(), &self.retry, &escrow).await {
                    Ok(resolution) => resolution,
                    Err(e) => {
                        tracing::warn!(%file_id, "could not reconcile escrow: {}", e);
                        report.errors.push(file_id);
                        continue;
                    }
                };

            match resolution {
                Resolution::Active(_) => report.activated.push(file_id),
                Resolution::Orphaned => report.orphaned.push(file_id),
                Resolution::Revoked => {}
                Resolution::Pending if self.is_stale(&escrow) => {
                    match self.db.mark_orphaned(&file_id).await {
                        Ok(_) | Err(EscrowError::InvalidTransition { .. }) => {}
                        Err(e) => {
                            tracing::warn!(%file_id, "could not orphan stale escrow: {}", e);
                            report.errors.push(file_id);
                            continue;
                        }
                    }
                    tracing::warn!(
                        %file_id,
                        tx = ?escrow.ledger_tx,
                        locator = %escrow.blob_locator,
                        "registration never confirmed, escrow orphaned for manual reconciliation"
                    );
                    report.orphaned.push(file_id);
                }
                Resolution::Pending => report.still_pending.push(file_id),
            }
        }

        report.needs_review = self
            .db
            .list_escrow_by_status(EscrowStatus::Orphaned)
            .await?
            .into_iter()
            .map(|escrow| escrow.file_id)
            .collect();

        tracing::info!(
            examined = report.examined,
            activated = report.activated.len(),
            orphaned = report.orphaned.len(),
            still_pending = report.still_pending.len(),
            errors = report.errors.len(),
            needs_review = report.needs_review.len(),
            "reconciliation pass complete"
        );
        Ok(report)
    }

    fn is_stale(&self, escrow: &EscrowRecord) -> bool {
        (Utc::now() - escrow.created_at)
            .to_std()
            .map(|age| age >= self.stale_after)
            .unwrap_or(false)
    }

    /// Run a pass every `interval` until shutdown is signalled
    pub async fn run(self, interval: Duration, mut shutdown_rx: watch::Receiver<()>) {
        let mut timer = tokio::time::interval(interval);
        // skip the immediate first tick
        timer.tick().await;

        tracing::info!(?interval, "reconciler started");
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!("reconciliation pass failed: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

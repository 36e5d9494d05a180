use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use common::blob::BlobLocator;
use common::crypto::{AlgorithmTag, CryptoError, Key, Nonce};
use common::types::{Address, FileId, Priority, ProvenanceId, TxReference};

use super::Database;

/// Lifecycle of an escrow row
///
/// `pending -> active | orphaned`, `active -> revoked`. Nothing moves
///  backwards and nothing is ever deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Stored, ledger registration not yet confirmed
    Pending,
    /// Registration confirmed; the row is recoverable
    Active,
    /// Ciphertext stored but registration never confirmed. Needs manual
    ///  reconciliation; the ciphertext may be the only copy.
    Orphaned,
    /// Withdrawn from recovery by an operator
    Revoked,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Active => "active",
            EscrowStatus::Orphaned => "orphaned",
            EscrowStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for EscrowStatus {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EscrowStatus::Pending),
            "active" => Ok(EscrowStatus::Active),
            "orphaned" => Ok(EscrowStatus::Orphaned),
            "revoked" => Ok(EscrowStatus::Revoked),
            other => Err(EscrowError::Corrupt(format!("unknown status {:?}", other))),
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key as persisted in escrow (standard base64 of the raw key)
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn new(wrapped: impl Into<String>) -> Self {
        Self(wrapped.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn unwrap_key(&self) -> Result<Key, CryptoError> {
        Key::unwrap(&self.0)
    }
}

impl From<&Key> for WrappedKey {
    fn from(key: &Key) -> Self {
        Self(key.wrap())
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WrappedKey(..)")
    }
}

/// The normalized file record, built once at ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub file_name: String,
    pub owner_uploader: Address,
    pub blob_locator: BlobLocator,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowRecord {
    pub file_id: FileId,
    pub wrapped_key: WrappedKey,
    pub nonce: Nonce,
    pub algorithm: AlgorithmTag,
    pub blob_locator: BlobLocator,
    /// `None` until the registration has been submitted
    pub ledger_tx: Option<TxReference>,
    /// Set when the registration is confirmed
    pub provenance_id: Option<ProvenanceId>,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything written at upload time, before the registration is submitted
#[derive(Debug, Clone)]
pub struct NewEscrow {
    pub file_id: FileId,
    pub file_name: String,
    pub owner_uploader: Address,
    pub priority: Priority,
    pub wrapped_key: WrappedKey,
    pub nonce: Nonce,
    pub algorithm: AlgorithmTag,
    pub blob_locator: BlobLocator,
    pub ledger_tx: Option<TxReference>,
}

/// What a reader needs to locate a file's ciphertext and anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedFile {
    pub blob_locator: BlobLocator,
    pub tx_reference: Option<TxReference>,
    pub nonce: Nonce,
    pub status: EscrowStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("no escrow record for file {0}")]
    NotFound(FileId),
    #[error("file {0} already exists")]
    AlreadyExists(FileId),
    #[error("escrow for file {file_id} is {from}, cannot move to {to}")]
    InvalidTransition {
        file_id: FileId,
        from: EscrowStatus,
        to: EscrowStatus,
    },
    #[error("corrupt escrow row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, EscrowError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| EscrowError::Corrupt(format!("timestamp out of range: {}", secs)))
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, EscrowError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| EscrowError::Corrupt(format!("{}: {}", column, e)))
}

impl FileRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, EscrowError> {
        let priority: i64 = row.try_get("priority")?;
        Ok(Self {
            file_id: parse_column(row, "file_id")?,
            file_name: row.try_get("file_name")?,
            owner_uploader: parse_column(row, "owner_uploader")?,
            blob_locator: BlobLocator::new(row.try_get::<String, _>("blob_locator")?),
            priority: Priority::try_from(priority)
                .map_err(|e| EscrowError::Corrupt(e.to_string()))?,
            created_at: timestamp(row.try_get("created_at")?)?,
        })
    }
}

impl EscrowRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, EscrowError> {
        let nonce: String = row.try_get("nonce")?;
        let algorithm: String = row.try_get("algorithm")?;
        let provenance_id: Option<String> = row.try_get("provenance_id")?;
        let ledger_tx: Option<String> = row.try_get("ledger_tx")?;

        Ok(Self {
            file_id: parse_column(row, "file_id")?,
            wrapped_key: WrappedKey::new(row.try_get::<String, _>("wrapped_key")?),
            nonce: Nonce::decode(&nonce).map_err(|e| EscrowError::Corrupt(e.to_string()))?,
            algorithm: AlgorithmTag::parse(&algorithm).ok_or_else(|| {
                EscrowError::Corrupt(format!("unknown algorithm {:?}", algorithm))
            })?,
            blob_locator: BlobLocator::new(row.try_get::<String, _>("blob_locator")?),
            ledger_tx: ledger_tx
                .map(|tx| tx.parse())
                .transpose()
                .map_err(|e| EscrowError::Corrupt(format!("ledger_tx: {}", e)))?,
            provenance_id: provenance_id
                .map(|id| id.parse())
                .transpose()
                .map_err(|e| EscrowError::Corrupt(format!("provenance_id: {}", e)))?,
            status: parse_column(row, "status")?,
            created_at: timestamp(row.try_get("created_at")?)?,
            updated_at: timestamp(row.try_get("updated_at")?)?,
        })
    }
}

const ESCROW_COLUMNS: &str = "file_id, wrapped_key, nonce, algorithm, blob_locator, ledger_tx, \
     provenance_id, status, created_at, updated_at";

/// Write (or rewrite) the encryption data of a file whose escrow has not
///  left `pending`. Returns false if the row exists in any other state.
async fn upsert_encryption_data<'e, E: SqliteExecutor<'e>>(
    executor: E,
    file_id: &FileId,
    wrapped_key: &WrappedKey,
    nonce: &Nonce,
    algorithm: AlgorithmTag,
    blob_locator: &BlobLocator,
    ledger_tx: Option<&TxReference>,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO escrow (file_id, wrapped_key, nonce, algorithm, blob_locator, ledger_tx,
                            status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        ON CONFLICT(file_id) DO UPDATE SET
            wrapped_key = excluded.wrapped_key,
            nonce = excluded.nonce,
            algorithm = excluded.algorithm,
            blob_locator = excluded.blob_locator,
            ledger_tx = excluded.ledger_tx,
            updated_at = excluded.updated_at
        WHERE escrow.status = 'pending'
        "#,
    )
    .bind(file_id.to_string())
    .bind(wrapped_key.as_str())
    .bind(nonce.encode())
    .bind(algorithm.as_str())
    .bind(blob_locator.as_str())
    .bind(ledger_tx.map(|tx| tx.to_hex()))
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

impl Database {
    /// Insert the file record and its pending escrow row in one transaction
    pub async fn put_escrow(&self, new: &NewEscrow) -> Result<(), EscrowError> {
        let mut tx = self.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO files (file_id, file_name, owner_uploader, blob_locator, priority, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO NOTHING
            "#,
        )
        .bind(new.file_id.to_string())
        .bind(&new.file_name)
        .bind(new.owner_uploader.to_hex())
        .bind(new.blob_locator.as_str())
        .bind(i64::from(new.priority.ordinal()))
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(EscrowError::AlreadyExists(new.file_id));
        }

        upsert_encryption_data(
            &mut *tx,
            &new.file_id,
            &new.wrapped_key,
            &new.nonce,
            new.algorithm,
            &new.blob_locator,
            new.ledger_tx.as_ref(),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Record where a file's ciphertext lives and which transaction anchors
    ///  its key. The file record must already exist, and escrow that has
    ///  left `pending` is never rewritten. The file record's locator moves
    ///  with the escrow's.
    pub async fn save_encryption_data(
        &self,
        file_id: &FileId,
        wrapped_key: &WrappedKey,
        nonce: &Nonce,
        blob_locator: &BlobLocator,
        tx_reference: &TxReference,
    ) -> Result<(), EscrowError> {
        let mut tx = self.begin().await?;

        let relocated = sqlx::query("UPDATE files SET blob_locator = ? WHERE file_id = ?")
            .bind(blob_locator.as_str())
            .bind(file_id.to_string())
            .execute(&mut *tx)
            .await?;
        if relocated.rows_affected() == 0 {
            return Err(EscrowError::NotFound(*file_id));
        }

        let written = upsert_encryption_data(
            &mut *tx,
            file_id,
            wrapped_key,
            nonce,
            AlgorithmTag::default(),
            blob_locator,
            Some(tx_reference),
        )
        .await?;

        if written {
            tx.commit().await?;
            return Ok(());
        }

        // dropping the transaction rolls back the locator change
        drop(tx);
        let current = self.get_escrow(file_id).await?;
        Err(EscrowError::InvalidTransition {
            file_id: *file_id,
            from: current.status,
            to: EscrowStatus::Pending,
        })
    }

    /// Attach the submitted registration to a pending row
    ///
    /// Returns `Ok(false)` if the row already carries this transaction.
    pub async fn set_ledger_tx(
        &self,
        file_id: &FileId,
        ledger_tx: &TxReference,
    ) -> Result<bool, EscrowError> {
        let result = sqlx::query(
            r#"
            UPDATE escrow
            SET ledger_tx = ?, updated_at = ?
            WHERE file_id = ? AND status = 'pending' AND ledger_tx IS NULL
            "#,
        )
        .bind(ledger_tx.to_hex())
        .bind(Utc::now().timestamp())
        .bind(file_id.to_string())
        .execute(&**self)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let current = self.get_escrow(file_id).await?;
        match current.ledger_tx {
            Some(existing) if existing == *ledger_tx => Ok(false),
            Some(existing) => Err(EscrowError::Corrupt(format!(
                "escrow for {} is already anchored by {}",
                file_id, existing
            ))),
            None => Err(EscrowError::InvalidTransition {
                file_id: *file_id,
                from: current.status,
                to: EscrowStatus::Pending,
            }),
        }
    }

    pub async fn get_file(&self, file_id: &FileId) -> Result<FileRecord, EscrowError> {
        let row = sqlx::query(
            r#"
            SELECT file_id, file_name, owner_uploader, blob_locator, priority, created_at
            FROM files
            WHERE file_id = ?
            "#,
        )
        .bind(file_id.to_string())
        .fetch_optional(&**self)
        .await?;

        match row {
            Some(row) => FileRecord::from_row(&row),
            None => Err(EscrowError::NotFound(*file_id)),
        }
    }

    pub async fn get_escrow(&self, file_id: &FileId) -> Result<EscrowRecord, EscrowError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM escrow WHERE file_id = ?",
            ESCROW_COLUMNS
        ))
        .bind(file_id.to_string())
        .fetch_optional(&**self)
        .await?;

        match row {
            Some(row) => EscrowRecord::from_row(&row),
            None => Err(EscrowError::NotFound(*file_id)),
        }
    }

    /// The locator, anchoring transaction and nonce of a file
    pub async fn retrieve_file(&self, file_id: &FileId) -> Result<RetrievedFile, EscrowError> {
        let escrow = self.get_escrow(file_id).await?;
        Ok(RetrievedFile {
            blob_locator: escrow.blob_locator,
            tx_reference: escrow.ledger_tx,
            nonce: escrow.nonce,
            status: escrow.status,
        })
    }

    /// Oldest first
    pub async fn list_escrow_by_status(
        &self,
        status: EscrowStatus,
    ) -> Result<Vec<EscrowRecord>, EscrowError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM escrow WHERE status = ? ORDER BY created_at ASC, file_id ASC",
            ESCROW_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&**self)
        .await?;

        rows.iter().map(EscrowRecord::from_row).collect()
    }

    /// `pending -> active`, recording the confirmed ledger record id
    ///
    /// Returns `Ok(false)` if the row was already active.
    pub async fn mark_active(
        &self,
        file_id: &FileId,
        provenance_id: &ProvenanceId,
    ) -> Result<bool, EscrowError> {
        self.transition(
            file_id,
            EscrowStatus::Pending,
            EscrowStatus::Active,
            Some(provenance_id),
        )
        .await
    }

    /// `pending -> orphaned`
    ///
    /// Returns `Ok(false)` if the row was already orphaned.
    pub async fn mark_orphaned(&self, file_id: &FileId) -> Result<bool, EscrowError> {
        self.transition(file_id, EscrowStatus::Pending, EscrowStatus::Orphaned, None)
            .await
    }

    /// `active -> revoked`
    pub async fn mark_revoked(&self, file_id: &FileId) -> Result<bool, EscrowError> {
        self.transition(file_id, EscrowStatus::Active, EscrowStatus::Revoked, None)
            .await
    }

    /// Compare-and-set on `status`. Exactly one of any set of racing callers
    ///  observes `Ok(true)`.
    async fn transition(
        &self,
        file_id: &FileId,
        from: EscrowStatus,
        to: EscrowStatus,
        provenance_id: Option<&ProvenanceId>,
    ) -> Result<bool, EscrowError> {
        let result = sqlx::query(
            r#"
            UPDATE escrow
            SET status = ?,
                provenance_id = COALESCE(?, provenance_id),
                updated_at = ?
            WHERE file_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(provenance_id.map(|id| id.to_hex()))
        .bind(Utc::now().timestamp())
        .bind(file_id.to_string())
        .bind(from.as_str())
        .execute(&**self)
        .await?;

        if result.rows_affected() == 1 {
            tracing::debug!(%file_id, %from, %to, "escrow status changed");
            return Ok(true);
        }

        let current = self.get_escrow(file_id).await?;
        if current.status == to {
            Ok(false)
        } else {
            Err(EscrowError::InvalidTransition {
                file_id: *file_id,
                from: current.status,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_escrow() -> (NewEscrow, Key) {
        let key = Key::generate().unwrap();
        let escrow = NewEscrow {
            file_id: FileId::generate(),
            file_name: "report.pdf".to_string(),
            owner_uploader: Address::from_bytes([2; 20]),
            priority: Priority::Admin,
            wrapped_key: WrappedKey::from(&key),
            nonce: Nonce::generate().unwrap(),
            algorithm: AlgorithmTag::Aes256Gcm,
            blob_locator: BlobLocator::new("blobs/one"),
            ledger_tx: Some(TxReference::from_bytes([9; 32])),
        };
        (escrow, key)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = Database::in_memory().await.unwrap();
        let (new, key) = new_escrow();
        db.put_escrow(&new).await.unwrap();

        let file = db.get_file(&new.file_id).await.unwrap();
        assert_eq!(file.file_name, "report.pdf");
        assert_eq!(file.priority, Priority::Admin);
        assert_eq!(file.owner_uploader, new.owner_uploader);

        let escrow = db.get_escrow(&new.file_id).await.unwrap();
        assert_eq!(escrow.status, EscrowStatus::Pending);
        assert_eq!(escrow.nonce, new.nonce);
        assert_eq!(escrow.ledger_tx, new.ledger_tx);
        assert_eq!(escrow.provenance_id, None);
        assert_eq!(escrow.wrapped_key.unwrap_key().unwrap(), key);
    }

    #[tokio::test]
    async fn test_duplicate_file_id_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let (new, _) = new_escrow();
        db.put_escrow(&new).await.unwrap();

        assert!(matches!(
            db.put_escrow(&new).await,
            Err(EscrowError::AlreadyExists(id)) if id == new.file_id
        ));
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let db = Database::in_memory().await.unwrap();
        let id = FileId::generate();
        assert!(matches!(db.get_escrow(&id).await, Err(EscrowError::NotFound(_))));
        assert!(matches!(db.get_file(&id).await, Err(EscrowError::NotFound(_))));
        assert!(matches!(db.mark_orphaned(&id).await, Err(EscrowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transitions_are_monotonic() {
        let db = Database::in_memory().await.unwrap();
        let (new, _) = new_escrow();
        db.put_escrow(&new).await.unwrap();
        let provenance_id = ProvenanceId::from_bytes([1; 32]);

        assert!(db.mark_active(&new.file_id, &provenance_id).await.unwrap());
        // idempotent
        assert!(!db.mark_active(&new.file_id, &provenance_id).await.unwrap());
        // an active row can never be orphaned
        assert!(matches!(
            db.mark_orphaned(&new.file_id).await,
            Err(EscrowError::InvalidTransition {
                from: EscrowStatus::Active,
                to: EscrowStatus::Orphaned,
                ..
            })
        ));

        let escrow = db.get_escrow(&new.file_id).await.unwrap();
        assert_eq!(escrow.provenance_id, Some(provenance_id));

        assert!(db.mark_revoked(&new.file_id).await.unwrap());
        assert!(matches!(
            db.mark_active(&new.file_id, &provenance_id).await,
            Err(EscrowError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_promotion_races_orphaning() {
        let db = Database::in_memory().await.unwrap();
        let (new, _) = new_escrow();
        db.put_escrow(&new).await.unwrap();
        let db = Arc::new(db);

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let db = db.clone();
            let file_id = new.file_id;
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    db.mark_active(&file_id, &ProvenanceId::from_bytes([i; 32]))
                        .await
                } else {
                    db.mark_orphaned(&file_id).await
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if let Ok(true) = handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let status = db.get_escrow(&new.file_id).await.unwrap().status;
        assert!(matches!(
            status,
            EscrowStatus::Active | EscrowStatus::Orphaned
        ));
    }

    #[tokio::test]
    async fn test_save_encryption_data_only_while_pending() {
        let db = Database::in_memory().await.unwrap();
        let (new, _) = new_escrow();
        db.put_escrow(&new).await.unwrap();

        let replacement = Key::generate().unwrap();
        let nonce = Nonce::generate().unwrap();
        let locator = BlobLocator::new("blobs/two");
        let tx = TxReference::from_bytes([3; 32]);
        db.save_encryption_data(
            &new.file_id,
            &WrappedKey::from(&replacement),
            &nonce,
            &locator,
            &tx,
        )
        .await
        .unwrap();

        let retrieved = db.retrieve_file(&new.file_id).await.unwrap();
        assert_eq!(retrieved.blob_locator, locator);
        assert_eq!(retrieved.tx_reference, Some(tx));
        assert_eq!(retrieved.nonce, nonce);
        assert_eq!(retrieved.status, EscrowStatus::Pending);
        // the file record follows the ciphertext
        assert_eq!(db.get_file(&new.file_id).await.unwrap().blob_locator, locator);

        db.mark_orphaned(&new.file_id).await.unwrap();
        let elsewhere = BlobLocator::new("blobs/three");
        assert!(matches!(
            db.save_encryption_data(&new.file_id, &WrappedKey::from(&replacement), &nonce, &elsewhere, &tx)
                .await,
            Err(EscrowError::InvalidTransition {
                from: EscrowStatus::Orphaned,
                ..
            })
        ));
        // a refused rewrite leaves both tables where they were
        assert_eq!(db.get_file(&new.file_id).await.unwrap().blob_locator, locator);
        assert_eq!(db.get_escrow(&new.file_id).await.unwrap().blob_locator, locator);
    }

    #[tokio::test]
    async fn test_ledger_tx_is_attached_once() {
        let db = Database::in_memory().await.unwrap();
        let (mut new, _) = new_escrow();
        new.ledger_tx = None;
        db.put_escrow(&new).await.unwrap();
        assert_eq!(db.get_escrow(&new.file_id).await.unwrap().ledger_tx, None);
        assert_eq!(db.retrieve_file(&new.file_id).await.unwrap().tx_reference, None);

        let tx = TxReference::from_bytes([4; 32]);
        assert!(db.set_ledger_tx(&new.file_id, &tx).await.unwrap());
        assert!(!db.set_ledger_tx(&new.file_id, &tx).await.unwrap());
        assert!(matches!(
            db.set_ledger_tx(&new.file_id, &TxReference::from_bytes([5; 32])).await,
            Err(EscrowError::Corrupt(_))
        ));
        assert_eq!(db.get_escrow(&new.file_id).await.unwrap().ledger_tx, Some(tx));
    }

    #[tokio::test]
    async fn test_unsubmitted_orphan_cannot_gain_a_tx() {
        let db = Database::in_memory().await.unwrap();
        let (mut new, _) = new_escrow();
        new.ledger_tx = None;
        db.put_escrow(&new).await.unwrap();
        db.mark_orphaned(&new.file_id).await.unwrap();

        assert!(matches!(
            db.set_ledger_tx(&new.file_id, &TxReference::from_bytes([4; 32])).await,
            Err(EscrowError::InvalidTransition {
                from: EscrowStatus::Orphaned,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_save_encryption_data_needs_file_record() {
        let db = Database::in_memory().await.unwrap();
        let key = Key::generate().unwrap();
        let result = db
            .save_encryption_data(
                &FileId::generate(),
                &WrappedKey::from(&key),
                &Nonce::generate().unwrap(),
                &BlobLocator::new("blobs/x"),
                &TxReference::default(),
            )
            .await;
        assert!(matches!(result, Err(EscrowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let db = Database::in_memory().await.unwrap();
        let (a, _) = new_escrow();
        let (b, _) = new_escrow();
        db.put_escrow(&a).await.unwrap();
        db.put_escrow(&b).await.unwrap();
        db.mark_orphaned(&b.file_id).await.unwrap();

        let pending = db.list_escrow_by_status(EscrowStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_id, a.file_id);

        let orphaned = db.list_escrow_by_status(EscrowStatus::Orphaned).await.unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].file_id, b.file_id);
    }

    #[test]
    fn test_wrapped_key_debug_is_redacted() {
        let key = Key::generate().unwrap();
        let wrapped = WrappedKey::from(&key);
        assert_eq!(format!("{:?}", wrapped), "WrappedKey(..)");
    }
}

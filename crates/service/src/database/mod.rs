mod escrow;
mod sqlite;

use std::ops::Deref;

use sqlx::SqlitePool;

pub use escrow::{
    EscrowError, EscrowRecord, EscrowStatus, FileRecord, NewEscrow, RetrievedFile, WrappedKey,
};

/// The key escrow database
///
/// A thin newtype over the pool. Queries live in `impl Database` blocks
///  next to the rows they read.
#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    pub async fn connect(database_url: &url::Url) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() == "sqlite" {
            let db = sqlite::connect_sqlite(database_url).await?;
            sqlite::migrate_sqlite(&db).await?;
            return Ok(Database::new(db));
        }

        Err(DatabaseSetupError::UnknownDbType(
            database_url.scheme().to_string(),
        ))
    }

    /// A private, migrated, in-memory database
    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let db = sqlite::connect_sqlite_memory().await?;
        sqlite::migrate_sqlite(&db).await?;
        Ok(Database::new(db))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    /// Round-trip a trivial query, for readiness checks
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.0).await?;
        Ok(())
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_ping() {
        let db = Database::in_memory().await.unwrap();
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let url = url::Url::parse("postgres://localhost/anchor").unwrap();
        assert!(matches!(
            Database::connect(&url).await,
            Err(DatabaseSetupError::UnknownDbType(scheme)) if scheme == "postgres"
        ));
    }
}

//! # Store Error Types

use thiserror::Error;

/// Errors from the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Driver-level failure (connection, query, transaction).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A unique key already exists.
    #[error("duplicate {0}")]
    Duplicate(String),

    /// A stored row cannot be mapped back into a record.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),

    /// A failure injected by the in-memory store.
    #[error("injected store failure: {0}")]
    Injected(&'static str),
}

impl StoreError {
    /// Map a driver error, lifting unique violations into [`StoreError::Duplicate`].
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Duplicate(what.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        assert!(StoreError::Duplicate("batch root 0xab".into())
            .to_string()
            .contains("0xab"));
        assert!(StoreError::Corrupt("certificate_hash".into())
            .to_string()
            .contains("certificate_hash"));
    }

    #[test]
    fn non_database_driver_errors_stay_database() {
        let err = StoreError::from_write(sqlx::Error::RowNotFound, "certificate");
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}

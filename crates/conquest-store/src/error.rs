//! Error types for the store layer.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! [`sqlx`] errors and separates uniqueness conflicts (which callers
//! reconcile) from genuine failures (which callers surface).

use conquest_types::UnknownCode;

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness constraint rejected the commit. Nothing was written.
    #[error("uniqueness conflict on {constraint}")]
    Conflict {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A stored status, goal, or kind code did not parse.
    #[error("invalid stored code: {0}")]
    Code(#[from] UnknownCode),

    /// A stored row could not be mapped back to an entity.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store refused the operation (for example, injected test failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this is a uniqueness conflict rather than a hard failure.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Classify a `sqlx` error, lifting unique violations into
    /// [`StoreError::Conflict`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict {
                constraint: db.constraint().unwrap_or("unknown").to_owned(),
            },
            other => Self::Postgres(other),
        }
    }
}

//! Error types for schema synchronization

/// Errors that can occur during a synchronization call
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The target schema itself is invalid (e.g. two increments columns in
    /// one table). Detected before any statement executes.
    #[error("schema definition error: {0}")]
    Definition(String),

    /// The database catalog returned inconsistent data for a table that was
    /// expected to exist.
    #[error("introspection error for table '{table}': {message}")]
    Introspection { table: String, message: String },

    /// `PRAGMA integrity_check` reported something other than "ok".
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// A generated statement failed during the execute phase. The enclosing
    /// transaction has been rolled back; the catalog is unchanged.
    #[error("statement failed: {statement}")]
    Execution {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Driver error outside the execute phase (version read, pragma, ...)
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl SyncError {
    /// The specific statement text that failed, if execution had begun.
    pub fn failed_statement(&self) -> Option<&str> {
        match self {
            Self::Execution { statement, .. } => Some(statement),
            _ => None,
        }
    }
}

/// Result type for synchronization internals
pub type SyncResult<T> = Result<T, SyncError>;

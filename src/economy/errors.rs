use thiserror::Error;

/// Errors raised by the economy engine.
///
/// The first group is recoverable and reported back to whoever issued the
/// command. The store group (`Sled`, `Bincode`, `Io`, `Json`, `SchemaMismatch`,
/// `Internal`) aborts the operation that hit it; nothing is committed.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// Character, project, trade, recipe or project type is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The character already has an active timed task.
    #[error("{character} is already busy with {task}")]
    Busy { character: String, task: String },

    /// Quantity, tool, component or batch shortfall.
    #[error("insufficient {resource}: need {needed}, have {available}")]
    InsufficientResource {
        resource: String,
        needed: i64,
        available: i64,
    },

    /// Malformed free-text arguments.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Disallowed resource type or permission denied.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Character cap, labor-hour cap or amount invariant violated.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A confirmation prompt was declined or timed out.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, catalog reads).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog documents that fail to parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (aborted transactions, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    pub fn insufficient(resource: impl Into<String>, needed: i64, available: i64) -> Self {
        EconomyError::InsufficientResource {
            resource: resource.into(),
            needed,
            available,
        }
    }

    /// True for the storage class of failures; everything else is a
    /// recoverable condition the caller can retry or correct.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EconomyError::Sled(_)
                | EconomyError::Bincode(_)
                | EconomyError::Io(_)
                | EconomyError::Json(_)
                | EconomyError::SchemaMismatch { .. }
                | EconomyError::Internal(_)
        )
    }
}

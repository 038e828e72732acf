//! Error types for the ORM core
//!
//! Two layers: `StoreError` is what the backing store reports, `OrmError`
//! is the taxonomy the core surfaces. Expected validation failure is NOT
//! an error here; it travels as `SaveOutcome::Invalid` plus the record's
//! per-column message map.

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by the backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Execution(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("no active transaction")]
    NoTransaction,
}

/// Errors surfaced by the ORM core
#[derive(Error, Debug)]
pub enum OrmError {
    /// A read or write against the backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No registered model class resolves the given name.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `Catalog::set_model` on a name that is already bound.
    #[error("model name already bound: {0}")]
    NameBound(String),

    /// A relationship name with no declaration on the model.
    #[error("unknown relationship: {0}")]
    UnknownRelationship(String),

    /// Mutation-requiring call on a deleted record.
    #[error("record is deleted; cannot {0}")]
    DeletedRecord(&'static str),

    /// Delete/refresh/increment on a record that was never persisted.
    #[error("record was never persisted; cannot {0}")]
    NotPersisted(&'static str),

    /// An operation needed a primary key value the record does not have.
    #[error("primary key value is missing")]
    MissingPrimaryKey,

    /// A keyed re-read found no row.
    #[error("record not found in table '{0}'")]
    NotFound(String),

    /// A weak model/catalog handle outlived its owner.
    #[error("model handle expired; owning catalog is gone")]
    CatalogGone,

    /// Inconsistent model or relationship configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_transparently() {
        let err = OrmError::from(StoreError::Execution("bad column".into()));
        assert_eq!(err.to_string(), "statement failed: bad column");
    }

    #[test]
    fn misuse_faults_name_the_operation() {
        assert_eq!(
            OrmError::DeletedRecord("save").to_string(),
            "record is deleted; cannot save"
        );
        assert_eq!(
            OrmError::NotPersisted("refresh").to_string(),
            "record was never persisted; cannot refresh"
        );
    }
}

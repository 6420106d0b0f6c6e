//! Error taxonomy for the normalization engine.
//!
//! Every variant is structural: it describes a problem with the schema or the
//! batch, never a transient condition, so callers should not retry. Any error
//! aborts the whole batch and no partial output is produced.

use thiserror::Error;

pub type NormalizeResult<T> = std::result::Result<T, NormalizeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Malformed table specification, detected before any record is processed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A table tried to push its identifier into a sibling row that cannot
    /// exist yet for the current record.
    #[error(
        "Schema order error: table '{table}' must be declared at or before '{sibling}' to propagate '{table}_id' (record {record})"
    )]
    SchemaOrder {
        table: String,
        sibling: String,
        record: usize,
    },

    /// Observed identifiers and foreign-key tuples of one content partition
    /// disagree and cannot be resolved.
    #[error(
        "Deduplication conflict in table '{table}': {identifiers} identifier(s) against {contexts} foreign-key context(s) for content {content}"
    )]
    DeduplicationConflict {
        table: String,
        content: String,
        identifiers: usize,
        contexts: usize,
    },

    /// Two different rows of one table produced the same identifier.
    #[error("Fingerprint collision in table '{table}': identifier {identifier} assigned to different rows")]
    FingerprintCollision { table: String, identifier: String },
}

impl NormalizeError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        NormalizeError::Configuration(message.into())
    }
}

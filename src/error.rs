//! # Error Taxonomy
//!
//! This module defines the typed errors the engine raises on constraint,
//! index, storage, and catalog failures. Call sites return `eyre::Result`
//! throughout and construct these with `.into()`, so every error travels
//! inside an `eyre::Report` and keeps its context chain; callers that need
//! to branch on the kind use `Report::downcast_ref::<DbError>()`.
//!
//! Each variant carries enough context (object name, expression text, key
//! description) to render an actionable message without re-querying the
//! catalog. Lower-level `std::io::Error`s are wrapped with `wrap_err` at the
//! storage boundary so the file name or statement text is never lost.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("duplicate key in unique index '{index}': {key}")]
    DuplicateKey { index: String, key: String },

    #[error("row not found in index '{index}'")]
    RowNotFound { index: String },

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("CHECK constraint '{constraint}' violated: {expr}")]
    CheckViolation { constraint: String, expr: String },

    #[error("referential constraint '{constraint}' violated: {detail}")]
    ReferentialViolation { constraint: String, detail: String },

    #[error("user '{user}' lacks rights on '{object}'")]
    InsufficientRights { user: String, object: String },

    #[error("object '{0}' already exists")]
    ObjectAlreadyExists(String),

    #[error("object '{0}' not found")]
    ObjectNotFound(String),

    #[error("statement canceled")]
    StatementCanceled,

    #[error("corrupted buffer: {0}")]
    CorruptedBuffer(String),
}

impl DbError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        DbError::Unsupported(what.into())
    }
}

/// Extracts the typed error from an `eyre::Report`, if it carries one.
pub fn db_error(report: &eyre::Report) -> Option<&DbError> {
    report.downcast_ref::<DbError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Result;

    fn raises_duplicate() -> Result<()> {
        Err(DbError::DuplicateKey {
            index: "IDX_A".into(),
            key: "(1)".into(),
        }
        .into())
    }

    #[test]
    fn typed_error_survives_report_downcast() {
        let err = raises_duplicate().unwrap_err();
        match db_error(&err) {
            Some(DbError::DuplicateKey { index, .. }) => assert_eq!(index, "IDX_A"),
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn context_wrapping_keeps_typed_error() {
        use eyre::WrapErr;
        let err = raises_duplicate()
            .wrap_err("while executing INSERT INTO t VALUES (1)")
            .unwrap_err();
        assert!(db_error(&err).is_some());
        assert!(format!("{:#}", err).contains("INSERT INTO t"));
    }
}

//! Decode and encode errors
//!
//! Every error here is a deterministic failure against text that has already
//! been fetched from the database. None of them is retryable.

use pgexpose_common::PgExposeError;

use crate::descriptor::TypeId;

/// What went wrong while scanning one `(...)` or `{...}` level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanErrorKind {
    #[error("expected '{0}'")]
    ExpectedOpen(char),

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("missing closing '{0}'")]
    UnterminatedGroup(char),

    #[error("backslash at end of input")]
    DanglingEscape,

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("empty unquoted array element")]
    EmptyElement,

    #[error("junk after closing '{0}'")]
    TrailingInput(char),

    #[error("sub-arrays with mismatched dimensions")]
    MismatchedDimensions,
}

/// Malformed record or array text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {context} literal at byte {position}: {kind}")]
pub struct ScanError {
    /// Byte offset into the text being scanned
    pub position: usize,
    pub kind: ScanErrorKind,
    /// `record` or `array`
    pub context: &'static str,
}

/// Leaf value that the scalar converter rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {pg_type} value \"{text}\": {reason}")]
pub struct ScalarError {
    pub pg_type: String,
    pub text: String,
    pub reason: String,
}

/// Failure to turn PostgreSQL text into a [`crate::ResolvedValue`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{type_name}: {source}")]
    Scan {
        type_name: String,
        #[source]
        source: ScanError,
    },

    #[error("{type_name}: expected {expected} fields, found {found}")]
    TypeMismatch {
        type_name: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Scalar(#[from] ScalarError),
}

/// Failure to write JSON
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Invalid descriptor construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("type {0} does not belong to this catalog")]
    UnknownType(TypeId),

    #[error("composite {type_name} declares field {field} twice")]
    DuplicateField { type_name: String, field: String },

    #[error("array of {element} must have at least one dimension")]
    ZeroDimensions { element: String },
}

impl From<DecodeError> for PgExposeError {
    fn from(err: DecodeError) -> Self {
        PgExposeError::DecodeError(err.to_string())
    }
}

impl From<EncodeError> for PgExposeError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Decode(inner) => inner.into(),
            other => PgExposeError::EncodeError(other.to_string()),
        }
    }
}

impl From<DescriptorError> for PgExposeError {
    fn from(err: DescriptorError) -> Self {
        PgExposeError::CatalogError(err.to_string())
    }
}

//! Error types for pgexpose services

use std::fmt;

/// Result type alias using PgExposeError
pub type Result<T> = std::result::Result<T, PgExposeError>;

/// Main error type for pgexpose services
#[derive(Debug, thiserror::Error)]
pub enum PgExposeError {
    /// Endpoint, schema object or type not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request/argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// PostgreSQL text value could not be decoded against its type
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Resolved value could not be written to the response
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Catalog introspection produced an unusable schema
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Schema has not been loaded yet
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PgExposeError {
    /// Create an internal error from any error type
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        PgExposeError::Internal(err.to_string())
    }

    /// Get the error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            PgExposeError::NotFound(_) => "NOT_FOUND",
            PgExposeError::InvalidArgument(_) => "INVALID_ARGUMENT",
            PgExposeError::DecodeError(_) => "DECODE_ERROR",
            PgExposeError::EncodeError(_) => "ENCODE_ERROR",
            PgExposeError::DatabaseError(_) => "DATABASE_ERROR",
            PgExposeError::CatalogError(_) => "CATALOG_ERROR",
            PgExposeError::ConfigError(_) => "CONFIG_ERROR",
            PgExposeError::ServiceUnavailable(_) => "UNAVAILABLE",
            PgExposeError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller caused this error (as opposed to the server or database)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PgExposeError::NotFound(_) | PgExposeError::InvalidArgument(_)
        )
    }
}

// Implement conversions from common error types
impl From<std::io::Error> for PgExposeError {
    fn from(err: std::io::Error) -> Self {
        PgExposeError::Internal(format!("IO error: {}", err))
    }
}

impl From<config::ConfigError> for PgExposeError {
    fn from(err: config::ConfigError) -> Self {
        PgExposeError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PgExposeError::NotFound("test".into()).code(), "NOT_FOUND");
        assert_eq!(
            PgExposeError::DecodeError("bad tuple".into()).code(),
            "DECODE_ERROR"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(PgExposeError::InvalidArgument("limit".into()).is_client_error());
        assert!(!PgExposeError::DecodeError("x".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: PgExposeError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client gone").into();
        assert_eq!(err.code(), "INTERNAL");
        assert!(err.to_string().contains("client gone"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: PgExposeError = config::ConfigError::Message("bad port".into()).into();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(!err.is_client_error());
    }
}

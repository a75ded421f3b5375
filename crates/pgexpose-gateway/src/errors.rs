//! Error handling and classification for the gateway
//!
//! Database errors are classified by SQLSTATE class into an HTTP status,
//! a category for logging, and an optional hint. Service errors map by
//! their stable code. Every error response has the same JSON body:
//!
//! ```json
//! {"error": "...", "code": "DATABASE_ERROR", "sqlstate": "22P02", "hint": "..."}
//! ```

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pgexpose_common::PgExposeError;
use serde::Serialize;
use tracing::{error, field, warn};

/// PostgreSQL SQLSTATE codes with special handling
/// See: https://www.postgresql.org/docs/current/errcodes-appendix.html
pub mod sqlstate {
    // Class 08: Connection Exception
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";

    // Class 22: Data Exception
    pub const DATA_EXCEPTION_CLASS: &str = "22";

    // Class 23: Integrity Constraint Violation
    pub const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

    // Class 28: Invalid Authorization Specification
    pub const INVALID_AUTHORIZATION_CLASS: &str = "28";

    // Class 42: Syntax Error or Access Rule Violation
    pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const UNDEFINED_COLUMN: &str = "42703";
    pub const UNDEFINED_FUNCTION: &str = "42883";
    pub const UNDEFINED_OBJECT: &str = "42704";

    // Class 53: Insufficient Resources
    pub const INSUFFICIENT_RESOURCES_CLASS: &str = "53";

    // Class 57: Operator Intervention
    pub const QUERY_CANCELED: &str = "57014";
    pub const ADMIN_SHUTDOWN: &str = "57P01";

    // Class P0: PL/pgSQL Error
    pub const RAISE_EXCEPTION: &str = "P0001";

    // Class XX: Internal Error
    pub const INTERNAL_ERROR: &str = "XX000";
}

/// Error category for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad argument values or constraint violations
    Data,
    /// Error raised on purpose by a routine
    Raised,
    /// Object missing from the database (schema changed since introspection)
    NotFound,
    /// Permission errors
    Auth,
    /// Statement timeout or cancellation
    Timeout,
    /// Database or pool unavailable
    Connection,
    /// Everything else
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Raised => write!(f, "raised"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

/// A classified database error
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// SQLSTATE reported by the server, if any
    pub sqlstate: Option<String>,
    pub category: ErrorCategory,
    pub status: StatusCode,
    pub message: String,
    pub hint: Option<String>,
    pub detail: Option<String>,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            category,
            status,
            message: message.into(),
            hint: None,
            detail: None,
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Add a hint unless the server already supplied one
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        if self.hint.is_none() {
            self.hint = Some(hint.into());
        }
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Classify a SQLSTATE into category and HTTP status
pub fn classify_sqlstate(code: &str) -> (ErrorCategory, StatusCode) {
    match code {
        sqlstate::RAISE_EXCEPTION => (ErrorCategory::Raised, StatusCode::BAD_REQUEST),
        sqlstate::INSUFFICIENT_PRIVILEGE => (ErrorCategory::Auth, StatusCode::FORBIDDEN),
        sqlstate::UNDEFINED_TABLE
        | sqlstate::UNDEFINED_COLUMN
        | sqlstate::UNDEFINED_FUNCTION
        | sqlstate::UNDEFINED_OBJECT => (ErrorCategory::NotFound, StatusCode::NOT_FOUND),
        sqlstate::QUERY_CANCELED => (ErrorCategory::Timeout, StatusCode::GATEWAY_TIMEOUT),
        sqlstate::ADMIN_SHUTDOWN => (ErrorCategory::Connection, StatusCode::SERVICE_UNAVAILABLE),
        _ => match code.get(..2).unwrap_or_default() {
            sqlstate::DATA_EXCEPTION_CLASS | sqlstate::INTEGRITY_CONSTRAINT_CLASS => {
                (ErrorCategory::Data, StatusCode::BAD_REQUEST)
            }
            sqlstate::CONNECTION_EXCEPTION_CLASS
            | sqlstate::INSUFFICIENT_RESOURCES_CLASS
            | sqlstate::INVALID_AUTHORIZATION_CLASS => {
                (ErrorCategory::Connection, StatusCode::SERVICE_UNAVAILABLE)
            }
            _ => (ErrorCategory::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        },
    }
}

/// Classify an error returned by the database driver
pub fn classify_database_error(err: &sqlx::Error) -> ClassifiedError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_else(|| sqlstate::INTERNAL_ERROR.to_string());
            let (category, status) = classify_sqlstate(&code);
            let mut classified = ClassifiedError::new(category, status, db_err.message()).with_sqlstate(code);

            if let Some(pg_err) = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                classified.hint = pg_err.hint().map(str::to_string);
                if let Some(detail) = pg_err.detail() {
                    classified = classified.with_detail(detail);
                }
            }

            if category == ErrorCategory::NotFound {
                classified = classified.with_hint("The database schema may have changed; POST /api/refresh to reload it.");
            }
            classified
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => ClassifiedError::new(
            ErrorCategory::Connection,
            StatusCode::SERVICE_UNAVAILABLE,
            "No database connection available",
        )
        .with_hint("Retry the request. If the issue persists, raise --max-connections."),
        sqlx::Error::Io(e) => ClassifiedError::new(
            ErrorCategory::Connection,
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Database connection lost: {}", e),
        ),
        other => ClassifiedError::new(
            ErrorCategory::Internal,
            StatusCode::INTERNAL_SERVER_ERROR,
            other.to_string(),
        ),
    }
}

/// HTTP status for a service error
pub fn status_for(err: &PgExposeError) -> StatusCode {
    match err {
        PgExposeError::NotFound(_) => StatusCode::NOT_FOUND,
        PgExposeError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        PgExposeError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] PgExposeError),

    #[error("{0}")]
    Database(ClassifiedError),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(classify_database_error(&err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => status_for(err),
            ApiError::Database(classified) => classified.status,
        }
    }

    /// SQLSTATE category; service errors have none
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ApiError::Service(_) => None,
            ApiError::Database(classified) => Some(classified.category),
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Service(err) => ErrorResponse {
                error: err.to_string(),
                code: err.code().to_string(),
                sqlstate: None,
                hint: None,
                detail: None,
            },
            ApiError::Database(classified) => ErrorResponse {
                error: classified.message.clone(),
                code: "DATABASE_ERROR".to_string(),
                sqlstate: classified.sqlstate.clone(),
                hint: classified.hint.clone(),
                detail: classified.detail.clone(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.category().map(field::display);
        if status.is_server_error() {
            error!(status = status.as_u16(), category, "Request failed: {}", self);
        } else {
            warn!(status = status.as_u16(), category, "Request rejected: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

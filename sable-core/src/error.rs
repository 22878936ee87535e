//! Error types for Sable

use thiserror::Error;

/// The main error type for Sable operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed statement input: marker/value count mismatch, a value the
    /// dialect cannot escape under the requested type tag, a misplaced
    /// `else_`/`end` call, and similar caller mistakes
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The subquery reference graph contains a cycle; raised before any SQL
    /// text is produced
    #[error("circular reference found in the statement tree, cannot parse the statement")]
    CircularReference,

    /// The driver or dialect structurally cannot support the operation
    /// (seek/count on an unbuffered result, limit on a dialect without an
    /// emulation path). Never worth retrying.
    #[error("operation not supported: {message}")]
    Unsupported { message: String },

    /// Backend execution failed; carries the native error code/message and
    /// the exact SQL text that was attempted
    #[error("query failed: {message}")]
    QueryExecution {
        message: String,
        code: Option<i64>,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + 'static>>,
    },

    /// Establishing the backend connection failed
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + 'static>>,
    },
}

/// Convenience Result type for Sable operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new query execution error
    pub fn query_execution(message: impl Into<String>, code: Option<i64>) -> Self {
        Self::QueryExecution {
            message: message.into(),
            code,
            sql: None,
            source: None,
        }
    }

    /// Create a new query execution error wrapping the backend's native error
    pub fn query_execution_from(
        message: impl Into<String>,
        code: Option<i64>,
        source: Box<dyn std::error::Error + 'static>,
    ) -> Self {
        Self::QueryExecution {
            message: message.into(),
            code,
            sql: None,
            source: Some(source),
        }
    }

    /// Create a new connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new connection error wrapping the backend's native error
    pub fn connection_from(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + 'static>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// The SQL text that was being executed when the error was raised,
    /// if any text had been generated by then
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }

    /// The backend's native error code, when one was reported
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::QueryExecution { code, .. } => *code,
            _ => None,
        }
    }

    /// Attach the failing SQL text to a query execution error that does not
    /// carry one yet. Other variants pass through unchanged.
    pub(crate) fn with_sql(self, text: &str) -> Self {
        match self {
            Self::QueryExecution {
                message,
                code,
                sql,
                source,
            } => Self::QueryExecution {
                message,
                code,
                sql: sql.or_else(|| Some(text.to_string())),
                source,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_argument("bad marker count");
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(err.to_string(), "invalid argument: bad marker count");
    }

    #[test]
    fn test_unsupported_error() {
        let err = Error::unsupported("cannot seek on unbuffered result");
        assert!(matches!(err, Error::Unsupported { .. }));
        assert_eq!(
            err.to_string(),
            "operation not supported: cannot seek on unbuffered result"
        );
    }

    #[test]
    fn test_query_execution_carries_sql_and_code() {
        let err =
            Error::query_execution("syntax error", Some(1)).with_sql("SELECT * FROM users;");
        assert_eq!(err.sql(), Some("SELECT * FROM users;"));
        assert_eq!(err.code(), Some(1));
    }

    #[test]
    fn test_with_sql_keeps_existing_text() {
        let err = Error::query_execution("boom", None)
            .with_sql("first")
            .with_sql("second");
        assert_eq!(err.sql(), Some("first"));
    }

    #[test]
    fn test_with_sql_ignores_other_variants() {
        let err = Error::CircularReference.with_sql("SELECT 1;");
        assert!(matches!(err, Error::CircularReference));
        assert_eq!(err.sql(), None);
    }
}

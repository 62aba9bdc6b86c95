//! Error types for docbridge

use thiserror::Error;

/// Result type alias for docbridge operations
pub type Result<T> = std::result::Result<T, DocBridgeError>;

/// Unified error type for all docbridge operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocBridgeError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Rejected input, raised before any driver call. Carries `<Operation>: <constraint>`.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrapped operational failure. Carries `<Operation>: Failed - <reason>`.
    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocBridgeError {
    /// Returns the message without the category prefix
    pub fn reason(&self) -> &str {
        match self {
            DocBridgeError::MongoDB(msg)
            | DocBridgeError::Database(msg)
            | DocBridgeError::Serialization(msg)
            | DocBridgeError::Deserialization(msg)
            | DocBridgeError::Connection(msg)
            | DocBridgeError::Query(msg)
            | DocBridgeError::Validation(msg)
            | DocBridgeError::Operation(msg)
            | DocBridgeError::Internal(msg) => msg,
        }
    }

    /// Returns true if this error was raised by input validation
    pub fn is_validation(&self) -> bool {
        matches!(self, DocBridgeError::Validation(_))
    }

    /// Returns true if this error is a connection-acquisition failure
    pub fn is_connection(&self) -> bool {
        matches!(self, DocBridgeError::Connection(_))
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for DocBridgeError {
    fn from(err: mongodb::error::Error) -> Self {
        DocBridgeError::MongoDB(err.to_string())
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for DocBridgeError {
    fn from(err: bson::ser::Error) -> Self {
        DocBridgeError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for DocBridgeError {
    fn from(err: bson::de::Error) -> Self {
        DocBridgeError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

//! Storage error types
//!
//! Unified error type for both chunk store backends.

use crate::embeddings::EmbeddingError;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Store misconfiguration, fatal at construction (e.g. embedding
    /// dimension mismatch). Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    Query(String),

    /// Backend write/read failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Embedding generation failed
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

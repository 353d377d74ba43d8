//! Error handling for the scenario tool
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the library should use these types for consistency.
//!
//! Per-node issues inside a batch (a missing property, a rejected move) are
//! *not* errors — they are reported in the batch result summary. Only
//! failures at the document or working-directory boundary surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the scenario tool
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// IO errors (file operations, process spawning, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required scenario file is absent at load or save time
    #[error("Missing required file: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Structural problems: type-detection ambiguity, broken invariants
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A transform script failed or its output failed validation
    #[error("Script '{name}' failed: {message}")]
    Script {
        name: String,
        message: String,
        /// Captured stdout/stderr from the script, attributed to its name
        log: String,
    },

    /// Disk/permission error during a staged save
    #[error("Persistence write failure: {0}")]
    PersistenceWrite(String),

    /// A strict-mode batch was rejected before any mutation
    #[error("Batch rejected: {0}")]
    Batch(String),

    /// Workspace layout errors (script/template directory problems)
    #[error("Workspace error: {0}")]
    Workspace(String),
}

/// Result type alias for scenario operations
pub type Result<T> = std::result::Result<T, ScenarioError>;

// Convenient error constructors
impl ScenarioError {
    /// Create a missing-file error
    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    /// Create an invalid-document error
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a script failure error
    pub fn script(
        name: impl Into<String>,
        message: impl Into<String>,
        log: impl Into<String>,
    ) -> Self {
        Self::Script {
            name: name.into(),
            message: message.into(),
            log: log.into(),
        }
    }

    /// Create a persistence write error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceWrite(msg.into())
    }

    /// Create a batch rejection error
    pub fn batch(msg: impl Into<String>) -> Self {
        Self::Batch(msg.into())
    }

    /// Create a workspace error
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }
}

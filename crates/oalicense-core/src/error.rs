//! Error types for oalicense-core

use std::time::Duration;

use thiserror::Error;

use crate::identifier::IdentifierType;

/// Result type alias for license lookup operations
pub type Result<T> = std::result::Result<T, LicenseError>;

/// Main error type for license lookup operations
#[derive(Error, Debug)]
pub enum LicenseError {
    /// Identifier failed validation against its asserted type
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A provider or license detector failed
    #[error("Detector fault: {0}")]
    Detector(#[from] DetectorFault),

    /// Cache backend errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Work could not be handed to the background workers
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Detector registration errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identifier type could not be determined
    #[error("unable to determine the type of the identifier: {0}")]
    UnknownType(String),

    /// A batch element was not an identifier at all
    #[error("malformed identifier {id}: {reason}")]
    Malformed { id: String, reason: String },
}

/// An identifier asserted a type that it does not structurally satisfy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("identifier asserts it is a {asserted}, but cannot validate: {value}")]
pub struct ValidationError {
    pub asserted: IdentifierType,
    pub value: String,
}

/// Detector-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorFault {
    /// The detector ran and reported an internal failure
    #[error("{detector} failed: {reason}")]
    Failed { detector: String, reason: String },

    /// The detector did not finish within the configured timeout
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    /// Fetching the provider page failed
    #[error("HTTP error from {url}: {reason}")]
    Http { url: String, reason: String },
}

impl DetectorFault {
    /// Convenience constructor for a generic detector failure
    pub fn failed(detector: impl Into<String>, reason: impl Into<String>) -> Self {
        DetectorFault::Failed {
            detector: detector.into(),
            reason: reason.into(),
        }
    }
}

/// Cache-specific errors
///
/// These never leave the cache store; they are logged and absorbed there.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend I/O or database error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Detector registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A license detector is already bound to this provider key and scope
    #[error("a {scope} detector is already registered for {key}")]
    AlreadyRegistered { key: String, scope: String },

    /// Provider key is empty after cleaning
    #[error("invalid provider key: {0:?}")]
    InvalidKey(String),
}

/// Dispatcher errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The worker pool has shut down
    #[error("worker pool is closed")]
    Closed,
}

/// Configuration validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Configuration text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

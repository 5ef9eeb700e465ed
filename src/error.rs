//! Error types for the cache ring

use thiserror::Error;

use crate::cache::NodeError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape a cache store or the resolver
///
/// Connectivity failures of individual nodes never show up here: stores
/// contain them and report a miss or `false` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Backend failure that is not a connectivity problem
    #[error("Cache node error: {0}")]
    Node(#[from] NodeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration document could not be parsed
    #[error("Failed to parse cache configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No factory registered under the requested store name
    #[error("Unknown cache store: {0}")]
    UnknownStore(String),

    /// A ring needs at least one node
    #[error("Cache ring must contain at least one node")]
    EmptyRing,

    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// A fetch computation failed
    #[error("Cache value computation failed: {0}")]
    Compute(String),
}

impl Error {
    /// True for the configuration family: a deployment defect rather than a
    /// runtime condition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Yaml(_) | Error::UnknownStore(_) | Error::EmptyRing
        )
    }
}

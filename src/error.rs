//! Error types for the aggregation engine

use thiserror::Error;

/// Main error type for the crate
///
/// Every variant is fatal for the execution that raised it: the engine
/// never retries and never returns partial output.
#[derive(Error, Debug)]
pub enum Error {
    /// Conflicting or missing declarations, overlapping result keys,
    /// schema mismatches and invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A provider did not implement a hook the active specializer needs
    #[error("Unimplemented hook: {0}")]
    UnimplementedHook(&'static str),

    /// A referenced index or column does not exist
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// The left table of a join lacks a key level of a result group
    #[error("Join key error: {0}")]
    JoinKey(String),

    /// A delta string could not be parsed
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    /// A frame operation failed
    #[error("Frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Whether this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("overlapping key district_12h");
        assert_eq!(
            err.to_string(),
            "Configuration error: overlapping key district_12h"
        );
        assert!(err.is_configuration());

        let err = Error::UnimplementedHook("aggregates");
        assert_eq!(err.to_string(), "Unimplemented hook: aggregates");
        assert!(!err.is_configuration());
    }
}

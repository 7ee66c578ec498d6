//! Error types for HomeManager operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all HomeManager crates. Uses `thiserror` for derive macros.
//!
//! The first four variants form the access-control taxonomy. They are terminal
//! for a request: nothing retries them locally, and the HTTP layer maps each
//! one to a status code at the boundary.

use thiserror::Error;

/// Errors that can occur in HomeManager operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, malformed, unsigned, or expired credential.
    ///
    /// Deliberately carries no detail: callers must not learn which
    /// verification step rejected the token.
    #[error("Could not validate credentials")]
    Unauthorized,

    /// Valid credential, but the principal may not act on the target.
    #[error("{0}")]
    Forbidden(String),

    /// The target resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A dependency the request needs is degraded.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A uniqueness rule was violated (duplicate email, type name, ...).
    #[error("{0}")]
    Conflict(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by a storage or broker backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a service unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// True for the kinds produced by access-control decisions.
    pub fn is_access_denial(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden(_) | Self::NotFound(_)
        )
    }
}

/// Result type alias using HomeManager's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_message_is_uniform() {
        assert_eq!(
            Error::Unauthorized.to_string(),
            "Could not validate credentials"
        );
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::forbidden("x"), Error::Forbidden(m) if m == "x"));
        assert!(matches!(Error::not_found("x"), Error::NotFound(_)));
        assert!(matches!(Error::unavailable("db"), Error::ServiceUnavailable(_)));
        assert!(matches!(Error::conflict("dup"), Error::Conflict(_)));
        assert!(matches!(Error::backend("boom"), Error::Backend(_)));
    }

    #[test]
    fn test_unavailable_display() {
        let err = Error::unavailable("postgres");
        assert_eq!(err.to_string(), "Service unavailable: postgres");
    }

    #[test]
    fn test_is_access_denial() {
        assert!(Error::Unauthorized.is_access_denial());
        assert!(Error::forbidden("no").is_access_denial());
        assert!(Error::not_found("gone").is_access_denial());
        assert!(!Error::unavailable("redis").is_access_denial());
        assert!(!Error::backend("io").is_access_denial());
    }
}

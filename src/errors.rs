//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror` covering every failure
//! the sync engine can surface: source/transport failures, disabled
//! operations, and the fail-fast contract violations raised during field
//! mapping and reply composition.

use thiserror::Error;

/// Application error type
///
/// Covers all error cases the inbox sync engine may encounter.
///
/// `Mapping` and `Compose` are programmer/configuration errors: they name the
/// exact missing field and the query parameter that must supply it, and are
/// never silently defaulted. Transport errors (`SourceUnavailable`,
/// `AuthUnavailable`, `RemoteError`) are caught at the top of a load cycle
/// and surfaced as a single error state.
#[derive(Debug, Error)]
pub enum AppError {
    /// Fetch, network, or parse failure on the configured data source
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    /// No credential obtainable from the host token provider
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),
    /// Non-success response from a remote read or write call
    #[error("remote error (status {status}): {body}")]
    RemoteError {
        /// HTTP status code returned by the remote endpoint
        status: u16,
        /// Response body, verbatim, for diagnostics
        body: String,
    },
    /// Caller attempted an operation not enabled in configuration
    #[error("operation disabled: {0}")]
    OperationDisabled(String),
    /// Required field missing from a raw record
    #[error("mapping error: {0}")]
    Mapping(String),
    /// Required identity missing on the message being replied to
    #[error("compose error: {0}")]
    Compose(String),
    /// Invalid configuration or caller input (validation failed)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `Mapping`
    ///
    /// `field` is the missing wire field; `remedy` names the query parameter
    /// the caller must request so the field is present on future fetches.
    pub fn mapping(field: &str, remedy: &str) -> Self {
        Self::Mapping(format!("required field '{field}' is missing; {remedy}"))
    }

    /// Convenience constructor for `Compose`
    pub fn compose(identity: &str, remedy: &str) -> Self {
        Self::Compose(format!(
            "required identity '{identity}' is missing; {remedy}"
        ))
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

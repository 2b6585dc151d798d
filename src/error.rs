//! Unified error types for Sheetquote

use serde::Serialize;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Sheetquote
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// DevTools protocol errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Step configuration is structurally invalid
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No element matched the selector
    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    /// Operation timed out
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Navigation failed
    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    /// Script execution failed
    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    /// Price text could not be parsed into a number
    #[error("Price parse error: {0}")]
    PriceParse(String),

    /// A captcha challenge blocks the run and no solver can clear it
    #[error("Captcha required: {0}")]
    CaptchaRequired(String),

    /// The browser session crashed or detached
    #[error("Session crashed: {0}")]
    SessionCrashed(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new invalid-configuration error
    pub fn config_invalid<S: Into<String>>(msg: S) -> Self {
        Error::ConfigInvalid(msg.into())
    }

    /// Create a new selector-not-found error
    pub fn selector_not_found<S: Into<String>>(selector: S) -> Self {
        Error::SelectorNotFound(selector.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new navigation failure
    pub fn navigation<S: Into<String>>(msg: S) -> Self {
        Error::NavigationFailure(msg.into())
    }

    /// Create a new script execution failure
    pub fn script<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecution(msg.into())
    }

    /// Create a new price parse error
    pub fn price_parse<S: Into<String>>(msg: S) -> Self {
        Error::PriceParse(msg.into())
    }

    /// Create a new captcha-required error
    pub fn captcha<S: Into<String>>(msg: S) -> Self {
        Error::CaptchaRequired(msg.into())
    }

    /// Create a new session crash error
    pub fn session_crashed<S: Into<String>>(msg: S) -> Self {
        Error::SessionCrashed(msg.into())
    }

    /// Create a new session-not-found error
    pub fn session_not_found<S: Into<String>>(id: S) -> Self {
        Error::SessionNotFound(id.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Network-class errors worth retrying with backoff before giving up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::NavigationFailure(_) | Error::WebSocket(_)
        )
    }

    /// Errors that mean the underlying browser session is gone and must be
    /// reported to the session manager rather than handled per step.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::SessionCrashed(_) | Error::SessionNotFound(_))
    }

    /// The coarse classification surfaced to callers in `ExecutionOutcome`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Error::SelectorNotFound(_) => ErrorKind::SelectorNotFound,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::NavigationFailure(_) => ErrorKind::NavigationFailure,
            Error::ScriptExecution(_) => ErrorKind::ScriptExecutionError,
            Error::PriceParse(_) => ErrorKind::PriceParseError,
            Error::CaptchaRequired(_) => ErrorKind::CaptchaRequired,
            Error::SessionCrashed(_) | Error::SessionNotFound(_) => ErrorKind::SessionCrashed,
            _ => ErrorKind::Internal,
        }
    }
}

/// Coarse error classification reported to callers.
///
/// Carries no payload so it can be compared, serialized and matched on by the
/// embedding application without dragging the full error chain along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConfigInvalid,
    SelectorNotFound,
    Timeout,
    NavigationFailure,
    ScriptExecutionError,
    PriceParseError,
    CaptchaRequired,
    SessionCrashed,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::SelectorNotFound => "selector_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NavigationFailure => "navigation_failure",
            ErrorKind::ScriptExecutionError => "script_execution_error",
            ErrorKind::PriceParseError => "price_parse_error",
            ErrorKind::CaptchaRequired => "captcha_required",
            ErrorKind::SessionCrashed => "session_crashed",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::timeout("slow page").is_transient());
        assert!(Error::navigation("connection reset").is_transient());
        assert!(!Error::selector_not_found("#price").is_transient());
        assert!(!Error::config_invalid("missing selector").is_transient());
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(Error::session_crashed("target detached").is_session_fatal());
        assert!(Error::session_not_found("s-1").is_session_fatal());
        assert!(!Error::timeout("slow page").is_session_fatal());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::price_parse("n/a").kind(), ErrorKind::PriceParseError);
        assert_eq!(
            Error::session_not_found("s-1").kind(),
            ErrorKind::SessionCrashed
        );
        assert_eq!(Error::internal("lock poisoned").kind(), ErrorKind::Internal);
    }
}

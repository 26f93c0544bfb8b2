//! Boundary object model for driving benchmark backends across a C ABI.
//!
//! A host harness talks to a backend exclusively through tagged [`Handle`]s.
//! The [`engine::Engine`] owns the descriptor catalog and mints handles, the
//! [`benchmark`] traits describe what a backend workload implements, and the
//! [`ffi`] module is the single adapter layer that turns Rust results into
//! numeric error codes.

pub mod backend;
pub mod benchmark;
pub mod core;
pub mod engine;
pub mod ffi;
pub mod harness;
pub mod logging;
pub mod report;

use thiserror::Error;

pub use crate::core::types::{ErrorCode, Handle};

/// Call succeeded.
pub const ECODE_SUCCESS: ErrorCode = 0;
/// Malformed or missing input; the caller may retry with corrected input.
pub const ECODE_INVALID_ARGS: ErrorCode = 0x7fff_fffe;
/// Unrecoverable failure; the host must release its handles and stop.
pub const ECODE_CRITICAL_ERROR: ErrorCode = 0x7fff_ffff;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Critical(String),
    #[error("{message}")]
    Backend { code: ErrorCode, message: String },
    #[error("invalid engine configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        BridgeError::InvalidArgs(msg.into())
    }

    pub fn critical(msg: impl Into<String>) -> Self {
        BridgeError::Critical(msg.into())
    }

    /// Numeric code reported across the boundary for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::InvalidArgs(_) | BridgeError::Config(_) => ECODE_INVALID_ARGS,
            BridgeError::Critical(_) | BridgeError::Other(_) => ECODE_CRITICAL_ERROR,
            BridgeError::Backend { code, .. } => *code,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.code() == ECODE_CRITICAL_ERROR
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BridgeError::invalid_args("x").code(), ECODE_INVALID_ARGS);
        assert_eq!(BridgeError::critical("x").code(), ECODE_CRITICAL_ERROR);
        let custom = BridgeError::Backend {
            code: 7,
            message: "custom".into(),
        };
        assert_eq!(custom.code(), 7);
        assert_eq!(custom.to_string(), "custom");
    }

    #[test]
    fn test_unknown_failures_are_critical() {
        let err: BridgeError = anyhow::anyhow!("boom").into();
        assert!(err.is_critical());
    }

    #[test]
    fn test_config_errors_are_invalid_args() {
        let err: BridgeError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert_eq!(err.code(), ECODE_INVALID_ARGS);
    }
}

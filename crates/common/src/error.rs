//! Error types shared across Multiwall crates.

use std::path::PathBuf;

/// Top-level error type for Multiwall operations.
///
/// The first five variants form the runtime taxonomy the coordinator reacts
/// to; the rest are plumbing for configuration, platform, and I/O failures.
#[derive(Debug, thiserror::Error)]
pub enum WallError {
    /// An operation referenced an instance that is no longer tracked.
    #[error("Instance #{instance} not found")]
    NotFound { instance: u32 },

    /// The captured window's process ended.
    #[error("Capture target closed for instance #{instance}")]
    StreamTargetClosed { instance: u32 },

    /// A capture stream failed with a code that may clear up on retry.
    #[error("Capture stream for instance #{instance} failed with code {code}")]
    StreamTransient { instance: u32, code: i64 },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// A caller broke an argument contract (for example zero grid sections).
    #[error("Input contract violation: {message}")]
    InputContractViolation { message: String },

    #[error("Input interception error: {message}")]
    InputInterception { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using WallError.
pub type WallResult<T> = Result<T, WallError>;

impl WallError {
    pub fn not_found(instance: u32) -> Self {
        Self::NotFound { instance }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::InputContractViolation {
            message: msg.into(),
        }
    }

    pub fn input_interception(msg: impl Into<String>) -> Self {
        Self::InputInterception {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the error describes a condition that persists until the user
    /// intervenes (as opposed to a one-off failure).
    pub fn is_standing(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::StreamTransient { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_instance() {
        let err = WallError::StreamTransient {
            instance: 4,
            code: -3801,
        };
        assert_eq!(
            err.to_string(),
            "Capture stream for instance #4 failed with code -3801"
        );
        assert_eq!(WallError::not_found(2).to_string(), "Instance #2 not found");
    }

    #[test]
    fn test_standing_conditions() {
        assert!(WallError::permission_denied("screen recording").is_standing());
        assert!(!WallError::not_found(1).is_standing());
        assert!(!WallError::contract("zero sections").is_standing());
    }
}

//! Error types and handling for huddle-core
//!
//! This module defines the errors that can surface from call setup and from the
//! session lifecycle, together with the narrower [`EngineError`] that the external
//! media, capture and routing collaborators report across their boundary.
//!
//! # Error Categories
//!
//! - **Configuration Errors** - Invalid settings, fix the config before retrying
//! - **Device Errors** - Camera or microphone problems found during setup
//! - **Session Errors** - Connect failures and operations invalid for the current state
//! - **Engine Errors** - Failures reported by the external media engine
//!
//! Most runtime failures never reach the caller as errors: publish and subscribe
//! failures are logged by the event router, a failed audio track only leaves the
//! call audio-less, and connect failures are retried by the session controller.
//! The one startup failure that is not recoverable is a missing front-facing
//! camera ([`HuddleError::FrontCameraMissing`]).
//!
//! ```rust
//! use huddle_core::HuddleError;
//!
//! let err = HuddleError::connect_failed("DailyStandup", "token expired");
//! assert_eq!(err.category(), "session");
//! assert!(err.is_recoverable());
//! ```

use thiserror::Error;

use crate::media::TrackKind;

/// Result type alias for huddle-core operations
pub type HuddleResult<T> = Result<T, HuddleError>;

/// Errors produced by the call coordination layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HuddleError {
    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Device errors
    #[error("No front-facing camera available for the {pipeline} capture pipeline")]
    FrontCameraMissing { pipeline: String },

    #[error("Camera access failed: {reason}")]
    CameraAccess { reason: String },

    /// Local track errors
    #[error("Local {kind} track already exists")]
    TrackAlreadyExists { kind: TrackKind },

    #[error("Failed to create local {kind} track: {reason}")]
    TrackCreationFailed { kind: TrackKind, reason: String },

    /// Session errors
    #[error("Connect to room '{room}' failed: {reason}")]
    ConnectFailed { room: String, reason: String },

    #[error("Invalid session state: expected {expected}, got {actual}")]
    InvalidSessionState { expected: String, actual: String },

    #[error("Call has already ended")]
    CallEnded,

    /// External engine errors
    #[error("Media engine error: {reason}")]
    Engine { reason: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl HuddleError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Create a connect failed error
    pub fn connect_failed(room: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed { room: room.into(), reason: reason.into() }
    }

    /// Create an invalid session state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl std::fmt::Display) -> Self {
        Self::InvalidSessionState { expected: expected.into(), actual: actual.to_string() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Check if this error is recoverable
    ///
    /// A recoverable error can go away by retrying the same operation later
    /// without changing configuration or device setup.
    pub fn is_recoverable(&self) -> bool {
        match self {
            HuddleError::ConnectFailed { .. }
            | HuddleError::Engine { .. }
            | HuddleError::CameraAccess { .. } => true,

            HuddleError::InvalidConfiguration { .. }
            | HuddleError::FrontCameraMissing { .. }
            | HuddleError::TrackAlreadyExists { .. } => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HuddleError::InvalidConfiguration { .. } => "configuration",

            HuddleError::FrontCameraMissing { .. } | HuddleError::CameraAccess { .. } => "device",

            HuddleError::TrackAlreadyExists { .. }
            | HuddleError::TrackCreationFailed { .. } => "track",

            HuddleError::ConnectFailed { .. }
            | HuddleError::InvalidSessionState { .. }
            | HuddleError::CallEnded => "session",

            HuddleError::Engine { .. } | HuddleError::InternalError { .. } => "system",
        }
    }
}

/// Failure reported by an external collaborator
///
/// The media transport, capture backend, camera system and audio route engine
/// are implemented outside this crate; they only ever hand back this error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("camera access denied: {0}")]
    CameraAccess(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("resource unavailable: {0}")]
    Unavailable(String),
}

impl From<EngineError> for HuddleError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CameraAccess(reason) => HuddleError::CameraAccess { reason },
            other => HuddleError::Engine { reason: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(HuddleError::invalid_config("room_name", "empty").category(), "configuration");
        assert_eq!(HuddleError::FrontCameraMissing { pipeline: "legacy".into() }.category(), "device");
        assert_eq!(HuddleError::TrackAlreadyExists { kind: TrackKind::Video }.category(), "track");
        assert_eq!(HuddleError::CallEnded.category(), "session");
        assert_eq!(HuddleError::internal_error("boom").category(), "system");
    }

    #[test]
    fn test_front_camera_missing_is_fatal() {
        let err = HuddleError::FrontCameraMissing { pipeline: "full".into() };
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "No front-facing camera available for the full capture pipeline");
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: HuddleError = EngineError::CameraAccess("camera 0 busy".into()).into();
        assert_eq!(err, HuddleError::CameraAccess { reason: "camera 0 busy".into() });

        let err: HuddleError = EngineError::Rejected("bad token".into()).into();
        assert_eq!(err, HuddleError::Engine { reason: "request rejected: bad token".into() });
        assert!(err.is_recoverable());
    }
}

//! Error types for capture sessions.
//!
//! Only [`CaptureError::DeviceUnavailable`] ever reaches the caller of
//! `start`. A degraded source is not an error: it is reported through the
//! `warning` field of the acquisition and the session statistics.

use crate::session::SessionStatus;

/// Errors raised by the capture core.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No usable input device, or permission was refused.
    #[error("audio device unavailable: {reason}")]
    DeviceUnavailable {
        /// What the device layer reported.
        reason: String,
    },

    /// An operation was invoked in a state that does not permit it.
    ///
    /// The controller logs and ignores these.
    #[error("cannot {operation} while {status}")]
    InvalidTransition {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the component was in.
        status: SessionStatus,
    },

    /// Releasing an acquired resource failed. Logged, never propagated.
    #[error("failed to release {resource}: {reason}")]
    ResourceReleaseFailed {
        /// Label of the resource.
        resource: String,
        /// Underlying failure.
        reason: String,
    },

    /// The recorder pipeline failed while finalizing.
    #[error("recording failed: {reason}")]
    Recording {
        /// Underlying failure.
        reason: String,
    },
}

impl CaptureError {
    pub fn device_unavailable(reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            reason: reason.into(),
        }
    }
}

/// Failures reported by a [`MediaDevices`](crate::audio::MediaDevices) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no matching device found")]
    NotFound,

    #[error("request cancelled by user")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("device backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_display() {
        let err = CaptureError::device_unavailable(DeviceError::PermissionDenied.to_string());
        assert_eq!(err.to_string(), "audio device unavailable: permission denied");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = CaptureError::InvalidTransition {
            operation: "finalize",
            status: SessionStatus::Idle,
        };
        assert_eq!(err.to_string(), "cannot finalize while idle");
    }
}

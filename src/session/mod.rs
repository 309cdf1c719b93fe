//! Capture session management
//!
//! This module provides the `SessionController` state machine that manages:
//! - Source acquisition (microphone, shared tab with fallback)
//! - Chunked recording and artifact finalization
//! - Release of every acquired resource through the janitor
//! - Observable session statistics

mod controller;
mod janitor;
mod stats;

pub use controller::{CaptureSession, SessionController};
pub use janitor::{AcquiredResource, JanitorHandle, ReleaseReport, ResourceId, ResourceJanitor};
pub use stats::{format_duration, format_size, SessionStats, SessionStatus};

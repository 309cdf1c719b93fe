//! HTTP API for the presentation layer
//!
//! This module exposes the session controller over REST:
//! - POST /session/start - Start a session (`{"mode": "microphone" | "shared_tab"}`)
//! - POST /session/stop - Stop and finalize the session
//! - GET /session/stats - Current statistics and chunk log
//! - GET /session/artifact - Last recording as WAV
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;

pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use audio::{
    Artifact, AudioFrame, AudioSourceMode, ChunkMeta, MediaDevices, SyntheticConfig,
    SyntheticDevices, FALLBACK_WARNING,
};
pub use config::{CaptureConfig, Config};
pub use error::{CaptureError, DeviceError};
pub use http::{create_router, AppState};
pub use session::{SessionController, SessionStats, SessionStatus};

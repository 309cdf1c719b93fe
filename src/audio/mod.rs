pub mod acquire;
pub mod artifact;
pub mod backend;
pub mod mixer;
pub mod recorder;
pub mod synthetic;

pub use acquire::{Acquisition, SourceAcquirer, FALLBACK_WARNING};
pub use artifact::{Artifact, PCM_MIME_TYPE, WAV_MIME_TYPE};
pub use backend::{
    AudioBackendConfig, AudioFrame, AudioSourceMode, AudioStreamSource, MediaDevices, MediaStream,
    MediaTrack, TrackControl, TrackKind,
};
pub use mixer::{AudioMixer, MixerConfig, StreamMixer};
pub use recorder::{ChunkMeta, RecorderConfig, SessionRecorder};
pub use synthetic::{DisplayBehavior, SyntheticConfig, SyntheticDevices, TrackProbe};

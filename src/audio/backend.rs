use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::DeviceError;
use crate::session::AcquiredResource;

/// Audio source requested for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceMode {
    /// Default input device only
    Microphone,
    /// Shared tab/display audio, mixed with the microphone
    SharedTab,
}

impl fmt::Display for AudioSourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSourceMode::Microphone => write!(f, "microphone"),
            AudioSourceMode::SharedTab => write!(f, "shared_tab"),
        }
    }
}

impl FromStr for AudioSourceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mic" | "microphone" => Ok(AudioSourceMode::Microphone),
            "tab" | "shared_tab" | "display" => Ok(AudioSourceMode::SharedTab),
            other => anyhow::bail!("unknown audio source mode: {}", other),
        }
    }
}

/// Where a frame was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// Microphone input
    Microphone,
    /// Shared tab/display audio
    Tab,
    /// Output of the mixing graph
    Mixed,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the track opened
    pub timestamp_ms: u64,
    /// Audio stream source
    pub source: AudioStreamSource,
}

impl AudioFrame {
    /// Little-endian PCM encoding of the samples
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Format requested from the device layer
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Frame cadence in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Device-side control over a live track
pub trait TrackControl: Send + Sync {
    /// Stop the track. Ends its frame channel.
    fn stop(&self) -> Result<()>;

    fn is_live(&self) -> bool;
}

/// A single track inside a [`MediaStream`]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub label: String,
    control: Arc<dyn TrackControl>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
}

impl MediaTrack {
    pub fn audio(
        id: impl Into<String>,
        label: impl Into<String>,
        control: Arc<dyn TrackControl>,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
            label: label.into(),
            control,
            frames: Some(frames),
        }
    }

    pub fn video(
        id: impl Into<String>,
        label: impl Into<String>,
        control: Arc<dyn TrackControl>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
            label: label.into(),
            control,
            frames: None,
        }
    }

    pub fn control(&self) -> Arc<dyn TrackControl> {
        Arc::clone(&self.control)
    }

    pub fn is_live(&self) -> bool {
        self.control.is_live()
    }

    /// Janitor entry that stops this track
    pub fn resource(&self) -> Box<dyn AcquiredResource> {
        Box::new(TrackResource {
            label: format!("{:?} track '{}' ({})", self.kind, self.label, self.id),
            control: self.control(),
        })
    }

    /// Take the frame receiver (audio tracks only, once)
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.take()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("live", &self.is_live())
            .finish()
    }
}

struct TrackResource {
    label: String,
    control: Arc<dyn TrackControl>,
}

impl AcquiredResource for TrackResource {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.control.stop()
    }
}

/// A set of tracks returned by one device request
#[derive(Debug, Default)]
pub struct MediaStream {
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn audio_track_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Audio)
            .count()
    }
}

/// Media device access
///
/// Implementations:
/// - [`SyntheticDevices`](super::synthetic::SyntheticDevices): generated tones,
///   configurable permission outcomes (CLI, HTTP server, tests)
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the default microphone as an audio-only stream
    async fn get_user_media(
        &self,
        config: &AudioBackendConfig,
    ) -> Result<MediaStream, DeviceError>;

    /// Open a user-chosen tab/display capture (video plus optional audio)
    async fn get_display_media(
        &self,
        config: &AudioBackendConfig,
    ) -> Result<MediaStream, DeviceError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

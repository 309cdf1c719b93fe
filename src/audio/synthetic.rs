// Synthetic media devices
//
// Generates sine tones on tokio intervals so the whole capture pipeline can
// run without hardware or a permission prompt. Every opened track is
// remembered so callers can check how often it was stopped.

use anyhow::Result;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::backend::{
    AudioBackendConfig, AudioFrame, AudioStreamSource, MediaDevices, MediaStream, MediaTrack,
    TrackControl, TrackKind,
};
use crate::error::DeviceError;

/// Outcome of a display-capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBehavior {
    /// Grant a video track plus one audio track
    Audio,
    /// Grant a video track only (tab without audio)
    VideoOnly,
    /// Permission denied
    Deny,
    /// User dismissed the picker
    Cancel,
}

/// Configuration for synthetic devices
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub microphone_available: bool,
    pub display: DisplayBehavior,
    /// Simulated permission prompt before the microphone opens
    pub microphone_prompt: Duration,
    /// Simulated picker delay before display capture resolves
    pub display_prompt: Duration,
    pub microphone_tone_hz: f64,
    pub tab_tone_hz: f64,
    /// Peak amplitude (0.0 to 1.0)
    pub amplitude: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            microphone_available: true,
            display: DisplayBehavior::Audio,
            microphone_prompt: Duration::ZERO,
            display_prompt: Duration::ZERO,
            microphone_tone_hz: 220.0,
            tab_tone_hz: 440.0,
            amplitude: 0.25,
        }
    }
}

/// Snapshot of a track opened by [`SyntheticDevices`]
#[derive(Debug, Clone)]
pub struct TrackProbe {
    pub label: String,
    pub kind: TrackKind,
    pub stop_count: usize,
    pub live: bool,
}

struct SyntheticTrack {
    label: String,
    kind: TrackKind,
    live: AtomicBool,
    stop_count: AtomicUsize,
}

impl TrackControl for SyntheticTrack {
    fn stop(&self) -> Result<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Synthetic track stopped: {}", self.label);
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Tone-generating implementation of [`MediaDevices`]
pub struct SyntheticDevices {
    config: SyntheticConfig,
    opened: Mutex<Vec<Arc<SyntheticTrack>>>,
    next_track: AtomicUsize,
}

impl SyntheticDevices {
    pub fn new(config: SyntheticConfig) -> Self {
        info!(
            "Synthetic devices initialized (microphone: {}, display: {:?})",
            config.microphone_available, config.display
        );

        Self {
            config,
            opened: Mutex::new(Vec::new()),
            next_track: AtomicUsize::new(0),
        }
    }

    /// Every track opened so far, in opening order
    pub fn opened_tracks(&self) -> Vec<TrackProbe> {
        let opened = self.opened.lock().unwrap_or_else(|e| e.into_inner());
        opened
            .iter()
            .map(|t| TrackProbe {
                label: t.label.clone(),
                kind: t.kind,
                stop_count: t.stop_count.load(Ordering::SeqCst),
                live: t.is_live(),
            })
            .collect()
    }

    fn register(&self, label: &str, kind: TrackKind) -> (String, Arc<SyntheticTrack>) {
        let n = self.next_track.fetch_add(1, Ordering::SeqCst);
        let track = Arc::new(SyntheticTrack {
            label: label.to_string(),
            kind,
            live: AtomicBool::new(true),
            stop_count: AtomicUsize::new(0),
        });
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&track));
        (format!("synthetic-{}", n), track)
    }

    fn open_tone_track(
        &self,
        label: &str,
        frequency: f64,
        source: AudioStreamSource,
        config: &AudioBackendConfig,
    ) -> MediaTrack {
        let (id, track) = self.register(label, TrackKind::Audio);
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(generate_tone(
            Arc::clone(&track),
            tx,
            ToneSpec {
                frequency,
                amplitude: self.config.amplitude,
                sample_rate: config.target_sample_rate,
                channels: config.target_channels,
                frame_ms: config.buffer_duration_ms.max(1),
                source,
            },
        ));

        MediaTrack::audio(id, label, track, rx)
    }
}

#[async_trait::async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(
        &self,
        config: &AudioBackendConfig,
    ) -> Result<MediaStream, DeviceError> {
        if !self.config.microphone_prompt.is_zero() {
            tokio::time::sleep(self.config.microphone_prompt).await;
        }

        if !self.config.microphone_available {
            return Err(DeviceError::NotFound);
        }

        let track = self.open_tone_track(
            "Synthetic Microphone",
            self.config.microphone_tone_hz,
            AudioStreamSource::Microphone,
            config,
        );
        Ok(MediaStream::new(vec![track]))
    }

    async fn get_display_media(
        &self,
        config: &AudioBackendConfig,
    ) -> Result<MediaStream, DeviceError> {
        if !self.config.display_prompt.is_zero() {
            tokio::time::sleep(self.config.display_prompt).await;
        }

        match self.config.display {
            DisplayBehavior::Deny => Err(DeviceError::PermissionDenied),
            DisplayBehavior::Cancel => Err(DeviceError::Cancelled),
            DisplayBehavior::VideoOnly => {
                let (id, video) = self.register("Synthetic Tab (video)", TrackKind::Video);
                Ok(MediaStream::new(vec![MediaTrack::video(
                    id,
                    "Synthetic Tab (video)",
                    video,
                )]))
            }
            DisplayBehavior::Audio => {
                let (id, video) = self.register("Synthetic Tab (video)", TrackKind::Video);
                let video = MediaTrack::video(id, "Synthetic Tab (video)", video);
                let audio = self.open_tone_track(
                    "Synthetic Tab (audio)",
                    self.config.tab_tone_hz,
                    AudioStreamSource::Tab,
                    config,
                );
                Ok(MediaStream::new(vec![video, audio]))
            }
        }
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct ToneSpec {
    frequency: f64,
    amplitude: f64,
    sample_rate: u32,
    channels: u16,
    frame_ms: u64,
    source: AudioStreamSource,
}

async fn generate_tone(track: Arc<SyntheticTrack>, tx: mpsc::Sender<AudioFrame>, spec: ToneSpec) {
    let frames_per_chunk = (spec.sample_rate as u64 * spec.frame_ms / 1000) as usize;
    let amplitude = spec.amplitude.clamp(0.0, 1.0) * i16::MAX as f64;
    let step = 2.0 * std::f64::consts::PI * spec.frequency / spec.sample_rate.max(1) as f64;

    let mut ticker = tokio::time::interval(Duration::from_millis(spec.frame_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut phase_index: u64 = 0;
    let mut timestamp_ms = 0;

    loop {
        ticker.tick().await;
        if !track.is_live() {
            break;
        }

        let mut samples = Vec::with_capacity(frames_per_chunk * spec.channels as usize);
        for _ in 0..frames_per_chunk {
            let value = ((phase_index as f64 * step).sin() * amplitude) as i16;
            for _ in 0..spec.channels {
                samples.push(value);
            }
            phase_index += 1;
        }

        let frame = AudioFrame {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            timestamp_ms,
            source: spec.source,
        };

        if tx.send(frame).await.is_err() {
            break;
        }
        timestamp_ms += spec.frame_ms;
    }

    debug!("Tone generator finished: {}", track.label);
}

// Source acquisition
//
// Microphone mode opens the default input. Shared-tab mode opens a display
// capture, drops its video right away, and mixes its audio with the
// microphone. If the display capture fails or carries no audio, the session
// falls back to the microphone and reports a warning.
//
// Every track is handed to the janitor as soon as it exists.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::backend::{AudioBackendConfig, AudioFrame, AudioSourceMode, MediaDevices, TrackKind};
use super::mixer::{MixerConfig, StreamMixer};
use crate::error::{CaptureError, DeviceError};
use crate::session::JanitorHandle;

/// Warning reported when shared-tab capture degrades to the microphone
pub const FALLBACK_WARNING: &str = "falling back to microphone";

/// A usable primary stream for the recorder
#[derive(Debug)]
pub struct Acquisition {
    pub frames: mpsc::Receiver<AudioFrame>,
    /// Mode actually captured (SharedTab only when tab audio is mixed in)
    pub effective_mode: AudioSourceMode,
    pub warning: Option<String>,
}

/// Obtains audio streams for a requested mode
#[derive(Clone)]
pub struct SourceAcquirer {
    devices: Arc<dyn MediaDevices>,
    format: AudioBackendConfig,
    mixer: StreamMixer,
    timeout: Option<Duration>,
}

impl SourceAcquirer {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        format: AudioBackendConfig,
        mixer: MixerConfig,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            devices,
            format,
            mixer: StreamMixer::new(mixer),
            timeout,
        }
    }

    pub async fn acquire(
        &self,
        mode: AudioSourceMode,
        janitor: &JanitorHandle,
    ) -> Result<Acquisition, CaptureError> {
        info!("Acquiring {} source via {}", mode, self.devices.name());

        match mode {
            AudioSourceMode::Microphone => Ok(Acquisition {
                frames: self.open_microphone(janitor).await?,
                effective_mode: AudioSourceMode::Microphone,
                warning: None,
            }),
            AudioSourceMode::SharedTab => match self.open_tab_audio(janitor).await {
                Some(tab_inputs) => {
                    // Tab audio is never recorded alone
                    let mic = self.open_microphone(janitor).await?;

                    let mut inputs = Vec::with_capacity(tab_inputs.len() + 1);
                    inputs.push(mic);
                    inputs.extend(tab_inputs);

                    info!("Mixing microphone with {} tab input(s)", inputs.len() - 1);
                    Ok(Acquisition {
                        frames: self.mixer.mix(inputs, janitor),
                        effective_mode: AudioSourceMode::SharedTab,
                        warning: None,
                    })
                }
                None => {
                    warn!("Tab audio unavailable, {}", FALLBACK_WARNING);
                    Ok(Acquisition {
                        frames: self.open_microphone(janitor).await?,
                        effective_mode: AudioSourceMode::Microphone,
                        warning: Some(FALLBACK_WARNING.to_string()),
                    })
                }
            },
        }
    }

    async fn open_microphone(
        &self,
        janitor: &JanitorHandle,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let stream = self
            .with_timeout(self.devices.get_user_media(&self.format))
            .await
            .map_err(|e| CaptureError::device_unavailable(format!("microphone: {}", e)))?;

        let mut primary = None;
        for mut track in stream.tracks {
            janitor.track(track.resource());
            if track.kind == TrackKind::Audio && primary.is_none() {
                primary = track.take_frames();
            }
        }

        primary.ok_or_else(|| {
            CaptureError::device_unavailable("microphone stream has no audio track")
        })
    }

    /// Frame receivers for every tab audio track, or None to fall back
    async fn open_tab_audio(&self, janitor: &JanitorHandle) -> Option<Vec<mpsc::Receiver<AudioFrame>>> {
        let stream = match self
            .with_timeout(self.devices.get_display_media(&self.format))
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Tab capture failed: {}", e);
                return None;
            }
        };

        let mut audio_ids = Vec::new();
        let mut inputs = Vec::new();

        for mut track in stream.tracks {
            let id = janitor.track(track.resource());
            match track.kind {
                // Visual capture is never needed
                TrackKind::Video => {
                    janitor.release(id);
                }
                TrackKind::Audio => {
                    audio_ids.push(id);
                    inputs.extend(track.take_frames());
                }
            }
        }

        if inputs.is_empty() {
            warn!("Tab capture returned no audio tracks");
            for id in audio_ids {
                janitor.release(id);
            }
            return None;
        }

        Some(inputs)
    }

    async fn with_timeout<T>(
        &self,
        request: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, DeviceError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(DeviceError::Timeout)),
            None => request.await,
        }
    }
}

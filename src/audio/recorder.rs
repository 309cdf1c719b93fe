use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::artifact::{Artifact, PCM_MIME_TYPE};
use super::backend::AudioFrame;
use crate::error::CaptureError;
use crate::session::SessionStatus;

/// Metadata for a single delivered chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// 1-based, contiguous within a session
    pub sequence_number: u64,
    pub byte_size: u64,
    pub received_at: DateTime<Utc>,
    /// Milliseconds since recording began
    pub offset_ms: u64,
}

impl fmt::Display for ChunkMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk {}: {} bytes", self.sequence_number, self.byte_size)
    }
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub session_id: String,
    /// Interval between periodic chunk deliveries
    pub chunk_interval: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Everything the capture task accumulated
struct Recording {
    chunks: Vec<ChunkMeta>,
    data: Vec<u8>,
    stopped_at: Instant,
}

struct Running {
    started_at: Instant,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<Recording>,
}

enum RecorderState {
    Ready,
    Running(Running),
    Finished(Arc<Artifact>),
}

/// Drives one capture: periodic chunks while running, one artifact on stop
pub struct SessionRecorder {
    config: RecorderConfig,
    state: RecorderState,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            state: RecorderState::Ready,
        }
    }

    /// Start capturing frames into periodic chunks.
    ///
    /// Every delivered chunk is also sent on the returned channel, in order.
    /// The channel closes once [`finalize`](Self::finalize) has returned.
    pub fn begin(
        &mut self,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> Result<mpsc::UnboundedReceiver<ChunkMeta>, CaptureError> {
        let status = match self.state {
            RecorderState::Ready => None,
            RecorderState::Running(_) => Some(SessionStatus::Recording),
            RecorderState::Finished(_) => Some(SessionStatus::Idle),
        };
        if let Some(status) = status {
            return Err(CaptureError::InvalidTransition {
                operation: "begin recording",
                status,
            });
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let started_at = Instant::now();

        info!(
            "Recorder started: {} (chunks every {}ms)",
            self.config.session_id,
            self.config.chunk_interval.as_millis()
        );

        let task = tokio::spawn(capture(
            frames,
            self.config.chunk_interval,
            started_at,
            stop_rx,
            chunk_tx,
        ));

        self.state = RecorderState::Running(Running {
            started_at,
            stop_tx,
            task,
        });

        Ok(chunk_rx)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RecorderState::Running(_))
    }

    /// Stop capture and build the artifact.
    ///
    /// Calling again returns the same artifact.
    pub async fn finalize(&mut self) -> Result<Arc<Artifact>, CaptureError> {
        let running = match std::mem::replace(&mut self.state, RecorderState::Ready) {
            RecorderState::Running(running) => running,
            RecorderState::Finished(artifact) => {
                self.state = RecorderState::Finished(Arc::clone(&artifact));
                return Ok(artifact);
            }
            RecorderState::Ready => {
                return Err(CaptureError::InvalidTransition {
                    operation: "finalize",
                    status: SessionStatus::Idle,
                })
            }
        };

        // Capture task may already be gone if it panicked
        let _ = running.stop_tx.send(());

        // Task completion is the final-chunk signal
        let recording = running.task.await.map_err(|e| CaptureError::Recording {
            reason: format!("capture task failed: {}", e),
        })?;

        let duration = recording.stopped_at.duration_since(running.started_at);
        let total_bytes = recording.chunks.iter().map(|c| c.byte_size).sum();

        let artifact = Arc::new(Artifact {
            session_id: self.config.session_id.clone(),
            bytes: recording.data,
            mime_type: PCM_MIME_TYPE,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            duration_ms: duration.as_millis() as u64,
            total_bytes,
            chunks: recording.chunks,
        });

        info!(
            "Recorder finalized: {} ({} chunks, {} bytes, {:.2}s)",
            self.config.session_id,
            artifact.chunk_count(),
            artifact.total_bytes,
            artifact.duration_ms as f64 / 1000.0
        );

        self.state = RecorderState::Finished(Arc::clone(&artifact));
        Ok(artifact)
    }
}

async fn capture(
    mut frames: mpsc::Receiver<AudioFrame>,
    chunk_interval: Duration,
    started_at: Instant,
    mut stop_rx: oneshot::Receiver<()>,
    chunk_tx: mpsc::UnboundedSender<ChunkMeta>,
) -> Recording {
    let mut ticker = tokio::time::interval_at(started_at + chunk_interval, chunk_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut recording = Recording {
        chunks: Vec::new(),
        data: Vec::new(),
        stopped_at: started_at,
    };
    let mut pending: Vec<u8> = Vec::new();
    let mut source_open = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => break,

            _ = ticker.tick() => {
                deliver(&mut recording, &mut pending, started_at, &chunk_tx);
            }

            frame = frames.recv(), if source_open => match frame {
                Some(frame) => pending.extend(frame.to_pcm_bytes()),
                None => {
                    warn!("Audio source ended before recording stopped");
                    source_open = false;
                }
            },
        }
    }

    // Keep what was captured up to the stop
    while let Ok(frame) = frames.try_recv() {
        pending.extend(frame.to_pcm_bytes());
    }
    if !pending.is_empty() {
        deliver(&mut recording, &mut pending, started_at, &chunk_tx);
    }

    recording.stopped_at = Instant::now();
    recording
}

fn deliver(
    recording: &mut Recording,
    pending: &mut Vec<u8>,
    started_at: Instant,
    chunk_tx: &mpsc::UnboundedSender<ChunkMeta>,
) {
    // Empty intervals still produce a (zero-size) chunk
    let meta = ChunkMeta {
        sequence_number: recording.chunks.len() as u64 + 1,
        byte_size: pending.len() as u64,
        received_at: Utc::now(),
        offset_ms: started_at.elapsed().as_millis() as u64,
    };
    debug!("{}", meta);

    recording.data.append(pending);
    recording.chunks.push(meta.clone());

    // Nobody listening is fine; the artifact still gets the chunk
    let _ = chunk_tx.send(meta);
}

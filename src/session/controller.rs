use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::janitor::JanitorHandle;
use super::stats::{SessionStats, SessionStatus};
use crate::audio::{
    Acquisition, Artifact, AudioSourceMode, MediaDevices, RecorderConfig, SessionRecorder,
    SourceAcquirer,
};
use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// The session currently owned by the controller
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub mode: AudioSourceMode,
    pub effective_mode: AudioSourceMode,
    pub started_at: DateTime<Utc>,
    pub warning: Option<String>,
}

struct ActiveSession {
    session: CaptureSession,
    recorder: SessionRecorder,
    /// Folds chunk deliveries into the stats channel
    stats_task: JoinHandle<()>,
}

enum Phase {
    Idle,
    Acquiring {
        session_id: Uuid,
        task: JoinHandle<()>,
    },
    Recording(ActiveSession),
    Finalizing,
}

impl Phase {
    fn status(&self) -> SessionStatus {
        match self {
            Phase::Idle => SessionStatus::Idle,
            Phase::Acquiring { .. } => SessionStatus::Acquiring,
            Phase::Recording(_) => SessionStatus::Recording,
            Phase::Finalizing => SessionStatus::Finalizing,
        }
    }

    fn is_acquiring(&self, id: Uuid) -> bool {
        matches!(self, Phase::Acquiring { session_id, .. } if *session_id == id)
    }
}

struct Inner {
    phase: Phase,
    artifact: Option<Arc<Artifact>>,
}

struct Shared {
    acquirer: SourceAcquirer,
    config: CaptureConfig,
    janitor: JanitorHandle,
    inner: Mutex<Inner>,
    stats_tx: Arc<watch::Sender<SessionStats>>,
}

/// Owner of the single capture session.
///
/// All operations are serialized: at most one session is acquiring or
/// recording at a time. Statistics are published on a watch channel
/// (see [`subscribe`](Self::subscribe)).
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(devices: Arc<dyn MediaDevices>, config: CaptureConfig) -> Self {
        let acquirer = SourceAcquirer::new(
            devices,
            config.backend_config(),
            config.mixer_config(),
            config.acquisition_timeout(),
        );
        let (stats_tx, _) = watch::channel(SessionStats::default());

        Self {
            shared: Arc::new(Shared {
                acquirer,
                config,
                janitor: JanitorHandle::new(),
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    artifact: None,
                }),
                stats_tx: Arc::new(stats_tx),
            }),
        }
    }

    /// Start a session in the given mode.
    ///
    /// Resolves once recording has begun, acquisition failed, or the
    /// acquisition was cancelled by [`stop`](Self::stop). Ignored unless idle.
    pub async fn start(&self, mode: AudioSourceMode) -> Result<(), CaptureError> {
        let session_id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut inner = self.shared.inner.lock().await;
            let status = inner.phase.status();
            if status != SessionStatus::Idle {
                let ignored = CaptureError::InvalidTransition {
                    operation: "start",
                    status,
                };
                debug!("Ignoring start: {}", ignored);
                return Ok(());
            }

            // Anything left from a previous session goes first
            self.shared.janitor.release_all();
            if inner.artifact.take().is_some() {
                debug!("Previous artifact superseded");
            }

            info!("Starting session {} ({})", session_id, mode);

            let shared = Arc::clone(&self.shared);
            let task = tokio::spawn(async move {
                let result = shared.acquire_and_record(session_id, mode).await;
                let _ = done_tx.send(result);
            });

            inner.phase = Phase::Acquiring { session_id, task };
            self.shared.stats_tx.send_replace(SessionStats {
                session_id: Some(session_id.to_string()),
                status: SessionStatus::Acquiring,
                mode: Some(mode),
                ..SessionStats::default()
            });
        }

        match done_rx.await {
            Ok(result) => result,
            Err(_) => {
                info!("Acquisition for session {} cancelled", session_id);
                Ok(())
            }
        }
    }

    /// Stop the session.
    ///
    /// While recording: finalizes, releases every resource and returns the
    /// artifact. While acquiring: cancels and releases partial resources.
    /// Otherwise a no-op returning `None`.
    pub async fn stop(&self) -> Result<Option<Arc<Artifact>>, CaptureError> {
        let mut inner = self.shared.inner.lock().await;

        match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Acquiring { session_id, task } => {
                info!("Cancelling acquisition for session {}", session_id);
                task.abort();
                // Let the task settle so nothing is tracked after the release
                let _ = task.await;
                self.shared.janitor.release_all();
                self.shared
                    .stats_tx
                    .send_modify(|s| s.status = SessionStatus::Idle);
                Ok(None)
            }
            Phase::Recording(active) => {
                inner.phase = Phase::Finalizing;
                self.shared
                    .stats_tx
                    .send_modify(|s| s.status = SessionStatus::Finalizing);

                let result = self.shared.finalize(active).await;
                inner.phase = Phase::Idle;

                match result {
                    Ok(artifact) => {
                        inner.artifact = Some(Arc::clone(&artifact));
                        Ok(Some(artifact))
                    }
                    Err(e) => Err(e),
                }
            }
            phase => {
                let ignored = CaptureError::InvalidTransition {
                    operation: "stop",
                    status: phase.status(),
                };
                debug!("Ignoring stop: {}", ignored);
                inner.phase = phase;
                Ok(None)
            }
        }
    }

    /// Page/session teardown: stop whatever is running and release everything
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            warn!("Session ended with error during shutdown: {}", e);
        }
        self.shared.janitor.release_all();
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.stats_tx.borrow().status
    }

    /// Current statistics, with elapsed time computed while recording
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.shared.stats_tx.borrow().clone();
        if stats.status == SessionStatus::Recording {
            if let Some(started_at) = stats.started_at {
                let elapsed = Utc::now()
                    .signed_duration_since(started_at)
                    .num_milliseconds()
                    .max(0) as u64;
                stats.elapsed_ms = stats.elapsed_ms.max(elapsed);
            }
        }
        stats
    }

    /// Stream of statistics updates
    pub fn subscribe(&self) -> watch::Receiver<SessionStats> {
        self.shared.stats_tx.subscribe()
    }

    /// Artifact of the last completed session, until a new session starts
    pub async fn last_artifact(&self) -> Option<Arc<Artifact>> {
        self.shared.inner.lock().await.artifact.clone()
    }

    /// Session currently recording, if any
    pub async fn current_session(&self) -> Option<CaptureSession> {
        match &self.shared.inner.lock().await.phase {
            Phase::Recording(active) => Some(active.session.clone()),
            _ => None,
        }
    }

    /// Number of resources the janitor currently holds
    pub fn tracked_resources(&self) -> usize {
        self.shared.janitor.len()
    }
}

impl Shared {
    async fn acquire_and_record(
        &self,
        session_id: Uuid,
        mode: AudioSourceMode,
    ) -> Result<(), CaptureError> {
        let acquired = self.acquirer.acquire(mode, &self.janitor).await;

        let mut inner = self.inner.lock().await;
        if !inner.phase.is_acquiring(session_id) {
            // stop() already cancelled and released this session
            debug!("Session {} no longer acquiring, dropping streams", session_id);
            return Ok(());
        }

        let result = acquired.and_then(|acquisition| self.begin_recording(session_id, mode, acquisition));

        match result {
            Ok(active) => {
                if let Some(warning) = &active.session.warning {
                    warn!("Session {}: {}", session_id, warning);
                }
                info!(
                    "Session {} recording ({} requested, {} captured)",
                    session_id, mode, active.session.effective_mode
                );
                inner.phase = Phase::Recording(active);
                Ok(())
            }
            Err(e) => {
                error!("Session {} failed to start: {}", session_id, e);
                self.janitor.release_all();
                inner.phase = Phase::Idle;
                self.stats_tx.send_modify(|s| {
                    s.status = SessionStatus::Idle;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    fn begin_recording(
        &self,
        session_id: Uuid,
        mode: AudioSourceMode,
        acquisition: Acquisition,
    ) -> Result<ActiveSession, CaptureError> {
        let mut recorder = SessionRecorder::new(RecorderConfig {
            session_id: session_id.to_string(),
            chunk_interval: self.config.chunk_interval(),
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        });
        let mut chunk_rx = recorder.begin(acquisition.frames)?;

        let session = CaptureSession {
            id: session_id,
            mode,
            effective_mode: acquisition.effective_mode,
            started_at: Utc::now(),
            warning: acquisition.warning,
        };

        self.stats_tx.send_modify(|s| {
            s.status = SessionStatus::Recording;
            s.effective_mode = Some(session.effective_mode);
            s.started_at = Some(session.started_at);
            s.warning = session.warning.clone();
        });

        let stats_tx = Arc::clone(&self.stats_tx);
        let stats_task = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                stats_tx.send_modify(|s| s.record_chunk(chunk));
            }
        });

        Ok(ActiveSession {
            session,
            recorder,
            stats_task,
        })
    }

    async fn finalize(&self, mut active: ActiveSession) -> Result<Arc<Artifact>, CaptureError> {
        let session_id = active.session.id;
        info!("Finalizing session {}", session_id);

        let result = active.recorder.finalize().await;

        // Recorder is done, so the chunk channel is closed
        if let Err(e) = active.stats_task.await {
            warn!("Stats task for session {} failed: {}", session_id, e);
        }

        let report = self.janitor.release_all();
        debug!(
            "Session {} released {} resources ({} failed)",
            session_id, report.released, report.failed
        );

        match result {
            Ok(artifact) => {
                self.stats_tx.send_modify(|s| {
                    s.status = SessionStatus::Idle;
                    s.total_bytes = artifact.total_bytes;
                    s.elapsed_ms = artifact.duration_ms;
                    s.chunk_count = artifact.chunk_count();
                    s.chunks = artifact.chunks.clone();
                });
                info!(
                    "Session {} complete: {} bytes in {} chunks",
                    session_id,
                    artifact.total_bytes,
                    artifact.chunk_count()
                );
                Ok(artifact)
            }
            Err(e) => {
                error!("Session {} failed to finalize: {}", session_id, e);
                self.stats_tx.send_modify(|s| {
                    s.status = SessionStatus::Idle;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }
}

// Real-time mixing graph for combining microphone and tab audio
//
// Each input stream is an independent source feeding one summing
// destination. The mixer buffers frames per input, emits a mixed frame once
// every open input has contributed one, and sums samples with clipping.
// Audio queued before the graph starts, or arriving further behind than the
// allowed delay, is dropped rather than replayed.
//
// The graph task and its destination are janitor resources. Releasing them
// ends the mixed output.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, AudioStreamSource};
use crate::session::{AcquiredResource, JanitorHandle};

/// Configuration for audio mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Sample rate of every input and of the output
    pub sample_rate: u32,
    /// Number of channels in output
    pub channels: u16,
    /// Maximum lag in milliseconds an input may fall behind before the
    /// other inputs are emitted without it. Buffered frames older than this
    /// relative to their input's newest frame are dropped.
    pub max_buffer_delay_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            max_buffer_delay_ms: 200,
        }
    }
}

/// Summing core of the mixing graph
pub struct AudioMixer {
    config: MixerConfig,
    /// Buffers for each input, keyed by input index
    buffers: BTreeMap<usize, VecDeque<AudioFrame>>,
    /// Inputs that have not ended yet
    open: BTreeMap<usize, bool>,
}

impl AudioMixer {
    pub fn new(config: MixerConfig, inputs: usize) -> Self {
        info!(
            "Audio mixer initialized: {}Hz, {} channels, {} inputs",
            config.sample_rate, config.channels, inputs
        );

        Self {
            config,
            buffers: (0..inputs).map(|i| (i, VecDeque::new())).collect(),
            open: (0..inputs).map(|i| (i, true)).collect(),
        }
    }

    /// Buffer a frame from the given input
    pub fn buffer_frame(&mut self, input: usize, frame: AudioFrame) {
        // Validate frame format
        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.config.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.config.channels {
            warn!(
                "Frame channel count mismatch: expected {}, got {}. Dropping frame.",
                self.config.channels, frame.channels
            );
            return;
        }

        if let Some(buffer) = self.buffers.get_mut(&input) {
            buffer.push_back(frame);
        }

        self.drop_stale_frames(input);
    }

    /// Drop frames that are too far behind the newest frame of their input
    fn drop_stale_frames(&mut self, input: usize) {
        let max_delay = self.config.max_buffer_delay_ms;
        let Some(buffer) = self.buffers.get_mut(&input) else {
            return;
        };
        let Some(newest) = buffer.back().map(|f| f.timestamp_ms) else {
            return;
        };
        let cutoff = newest.saturating_sub(max_delay);

        let mut dropped = 0;
        while buffer.front().is_some_and(|f| f.timestamp_ms < cutoff) {
            buffer.pop_front();
            dropped += 1;
        }

        if dropped > 0 {
            warn!(
                "Dropped {} stale frame(s) from mixer input {} (newest at {}ms)",
                dropped, input, newest
            );
        }
    }

    /// Mark an input as ended; the others keep flowing without it
    pub fn close_input(&mut self, input: usize) {
        if let Some(open) = self.open.get_mut(&input) {
            debug!("Mixer input {} ended", input);
            *open = false;
        }
    }

    pub fn all_inputs_closed(&self) -> bool {
        self.open.values().all(|open| !open)
    }

    /// Mix the next output frame if the buffers allow it
    pub fn mix_ready(&mut self) -> Option<AudioFrame> {
        let waiting_on_open_input = self
            .buffers
            .iter()
            .any(|(input, buffer)| buffer.is_empty() && self.open[input]);

        if waiting_on_open_input && !self.lag_exceeded() {
            return None;
        }

        self.mix_next_chunk()
    }

    /// Mix whatever is left once every input has ended
    pub fn flush(&mut self) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        while let Some(frame) = self.mix_next_chunk() {
            out.push(frame);
        }
        out
    }

    /// True if some buffer holds more than the allowed delay of audio
    fn lag_exceeded(&self) -> bool {
        self.buffers.values().any(|buffer| {
            match (buffer.front(), buffer.back()) {
                (Some(first), Some(last)) => {
                    last.timestamp_ms.saturating_sub(first.timestamp_ms)
                        >= self.config.max_buffer_delay_ms
                }
                _ => false,
            }
        })
    }

    /// Pop one frame from each non-empty buffer and mix them
    fn mix_next_chunk(&mut self) -> Option<AudioFrame> {
        let frames: Vec<AudioFrame> = self
            .buffers
            .values_mut()
            .filter_map(|buffer| buffer.pop_front())
            .collect();

        if frames.is_empty() {
            return None;
        }

        Some(self.mix_multiple_frames(&frames))
    }

    /// Mix audio frames together by adding their samples
    ///
    /// Shorter frames are zero-padded to the longest one
    fn mix_multiple_frames(&self, frames: &[AudioFrame]) -> AudioFrame {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);

        let mixed_samples = (0..max_len)
            .map(|i| {
                let sum: i32 = frames
                    .iter()
                    .map(|frame| frame.samples.get(i).copied().unwrap_or(0) as i32)
                    .sum();
                // Clip to prevent overflow
                sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        AudioFrame {
            samples: mixed_samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
            source: AudioStreamSource::Mixed,
        }
    }
}

/// Builds mixing graphs whose nodes are registered with the janitor
#[derive(Debug, Clone, Default)]
pub struct StreamMixer {
    config: MixerConfig,
}

impl StreamMixer {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }

    /// Connect every input into one summing destination.
    ///
    /// Returns the destination's output. The output ends when all inputs end
    /// or when the graph resources are released. Frames already queued on an
    /// input were captured before the graph existed and are discarded.
    pub fn mix(
        &self,
        inputs: Vec<mpsc::Receiver<AudioFrame>>,
        janitor: &JanitorHandle,
    ) -> mpsc::Receiver<AudioFrame> {
        let inputs: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(input, mut rx)| {
                let mut discarded = 0;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!("Discarded {} queued frame(s) on mixer input {}", discarded, input);
                }
                rx
            })
            .collect();

        let (out_tx, out_rx) = mpsc::channel(64);
        let destination_live = Arc::new(AtomicBool::new(true));
        let mixer = AudioMixer::new(self.config.clone(), inputs.len());

        let task = tokio::spawn(run_graph(
            mixer,
            inputs,
            out_tx,
            Arc::clone(&destination_live),
        ));

        janitor.track(Box::new(GraphContext {
            abort: task.abort_handle(),
        }));
        janitor.track(Box::new(GraphDestination {
            live: destination_live,
        }));

        out_rx
    }
}

async fn run_graph(
    mut mixer: AudioMixer,
    inputs: Vec<mpsc::Receiver<AudioFrame>>,
    out: mpsc::Sender<AudioFrame>,
    destination_live: Arc<AtomicBool>,
) {
    // Each input yields its frames followed by an end marker
    let tagged = inputs.into_iter().enumerate().map(|(input, rx)| {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|f| (Some(f), rx)) })
            .chain(stream::once(async { None }))
            .map(move |frame| (input, frame))
            .boxed()
    });
    let mut merged = stream::select_all(tagged);

    info!("Mixing graph started");

    'graph: while let Some(first) = merged.next().await {
        // Take everything already waiting so a backlog is buffered, and
        // trimmed, as one batch
        let mut batch = vec![first];
        while let Some(Some(next)) = merged.next().now_or_never() {
            batch.push(next);
        }

        for (input, frame) in batch {
            match frame {
                Some(frame) => mixer.buffer_frame(input, frame),
                None => mixer.close_input(input),
            }
        }

        let ready: Vec<AudioFrame> = if mixer.all_inputs_closed() {
            mixer.flush()
        } else {
            std::iter::from_fn(|| mixer.mix_ready()).collect()
        };

        for mixed in ready {
            if !destination_live.load(Ordering::SeqCst) || out.send(mixed).await.is_err() {
                break 'graph;
            }
        }
    }

    info!("Mixing graph stopped");
}

struct GraphContext {
    abort: AbortHandle,
}

impl AcquiredResource for GraphContext {
    fn label(&self) -> String {
        "mixing graph context".to_string()
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.abort.abort();
        Ok(())
    }
}

struct GraphDestination {
    live: Arc<AtomicBool>,
}

impl AcquiredResource for GraphDestination {
    fn label(&self) -> String {
        "mixing graph destination".to_string()
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }
}

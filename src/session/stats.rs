use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::{AudioSourceMode, ChunkMeta};

/// Lifecycle of the controller's single session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Finalizing,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Acquiring => "acquiring",
            SessionStatus::Recording => "recording",
            SessionStatus::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Observable statistics about the current (or last) session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Option<String>,

    pub status: SessionStatus,

    /// Mode the caller asked for
    pub mode: Option<AudioSourceMode>,

    /// Mode actually captured after any fallback
    pub effective_mode: Option<AudioSourceMode>,

    /// When recording began
    pub started_at: Option<DateTime<Utc>>,

    /// Sum of delivered chunk sizes
    pub total_bytes: u64,

    pub elapsed_ms: u64,

    pub chunk_count: usize,

    /// Ordered chunk log
    pub chunks: Vec<ChunkMeta>,

    /// Set when the requested mode was degraded
    pub warning: Option<String>,

    /// Last error surfaced to the caller
    pub last_error: Option<String>,
}

impl SessionStats {
    pub(crate) fn record_chunk(&mut self, chunk: ChunkMeta) {
        self.total_bytes += chunk.byte_size;
        self.elapsed_ms = self.elapsed_ms.max(chunk.offset_ms);
        self.chunks.push(chunk);
        self.chunk_count = self.chunks.len();
    }

    /// Chunk log lines, e.g. `Chunk 1: 4096 bytes`
    pub fn chunk_log(&self) -> Vec<String> {
        self.chunks.iter().map(ToString::to_string).collect()
    }

    /// One-line summary, e.g. `0.01 MB (10240 bytes) in 6.00s, 3 chunks`
    pub fn summary(&self) -> String {
        format!(
            "{} in {}, {} chunks",
            format_size(self.total_bytes),
            format_duration(self.elapsed_ms),
            self.chunk_count
        )
    }
}

/// Render a byte count as `X.XX MB (N bytes)`
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB ({} bytes)", bytes as f64 / (1024.0 * 1024.0), bytes)
}

/// Render milliseconds as `D.DDs`
pub fn format_duration(ms: u64) -> String {
    format!("{:.2}s", ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(sequence_number: u64, byte_size: u64, offset_ms: u64) -> ChunkMeta {
        ChunkMeta {
            sequence_number,
            byte_size,
            received_at: Utc::now(),
            offset_ms,
        }
    }

    #[test]
    fn test_record_chunk_accumulates() {
        let mut stats = SessionStats::default();
        stats.record_chunk(chunk(1, 4096, 2000));
        stats.record_chunk(chunk(2, 4096, 4000));
        stats.record_chunk(chunk(3, 2048, 6000));

        assert_eq!(stats.total_bytes, 10240);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.elapsed_ms, 6000);
        assert_eq!(
            stats.chunk_log(),
            vec![
                "Chunk 1: 4096 bytes",
                "Chunk 2: 4096 bytes",
                "Chunk 3: 2048 bytes"
            ]
        );
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_size(10240), "0.01 MB (10240 bytes)");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB (3145728 bytes)");
        assert_eq!(format_duration(6000), "6.00s");
        assert_eq!(format_duration(1234), "1.23s");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Finalizing).unwrap();
        assert_eq!(json, "\"finalizing\"");
    }
}

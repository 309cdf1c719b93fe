use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

use super::recorder::ChunkMeta;

/// Mime type of the raw recording (16-bit little-endian PCM)
pub const PCM_MIME_TYPE: &str = "audio/L16";

/// Mime type of [`Artifact::to_wav`] output
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// The finalized, immutable output of one session
#[derive(Debug)]
pub struct Artifact {
    pub session_id: String,
    /// Concatenation of every chunk, in delivery order
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    /// Elapsed time between begin and stop
    pub duration_ms: u64,
    /// Sum of all chunk byte sizes
    pub total_bytes: u64,
    pub chunks: Vec<ChunkMeta>,
}

impl Artifact {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Wrap the PCM data in a WAV container
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.bytes.len() + 44));
        {
            let mut writer = WavWriter::new(&mut cursor, self.wav_spec())
                .context("Failed to create in-memory WAV writer")?;
            for sample in self.samples() {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the recording to disk as a WAV file
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = WavWriter::create(path, self.wav_spec())
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for sample in self.samples() {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Artifact written: {} ({} bytes PCM, {:.2}s)",
            path.display(),
            self.total_bytes,
            self.duration_ms as f64 / 1000.0
        );

        Ok(())
    }
}

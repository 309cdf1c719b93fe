// Artifact export tests

use anyhow::Result;
use capture_session::audio::{Artifact, ChunkMeta, PCM_MIME_TYPE};
use chrono::Utc;
use hound::WavReader;
use std::io::Cursor;
use tempfile::TempDir;

fn artifact(samples: &[i16], channels: u16) -> Artifact {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let total_bytes = bytes.len() as u64;

    Artifact {
        session_id: "artifact-test".to_string(),
        bytes,
        mime_type: PCM_MIME_TYPE,
        sample_rate: 16000,
        channels,
        duration_ms: 1000,
        total_bytes,
        chunks: vec![ChunkMeta {
            sequence_number: 1,
            byte_size: total_bytes,
            received_at: Utc::now(),
            offset_ms: 1000,
        }],
    }
}

#[test]
fn test_to_wav_round_trips_samples() -> Result<()> {
    let samples: Vec<i16> = (0..1600).map(|i| ((i % 200) * 100 - 10000) as i16).collect();
    let artifact = artifact(&samples, 1);

    let wav = artifact.to_wav()?;
    let mut reader = WavReader::new(Cursor::new(wav))?;

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let decoded: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(decoded, samples);

    Ok(())
}

#[test]
fn test_empty_artifact_is_valid_wav() -> Result<()> {
    let artifact = artifact(&[], 1);

    let wav = artifact.to_wav()?;
    let reader = WavReader::new(Cursor::new(wav))?;

    assert_eq!(reader.len(), 0);
    Ok(())
}

#[test]
fn test_write_wav_to_disk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("session.wav");
    let samples = vec![100i16, -100, 200, -200];
    let artifact = artifact(&samples, 2);

    artifact.write_wav(&path)?;

    assert!(path.exists());
    let mut reader = WavReader::open(&path)?;
    assert_eq!(reader.spec().channels, 2);
    let decoded: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(decoded, samples);

    Ok(())
}

#[test]
fn test_chunk_display() {
    let chunk = ChunkMeta {
        sequence_number: 2,
        byte_size: 4096,
        received_at: Utc::now(),
        offset_ms: 4000,
    };

    assert_eq!(chunk.to_string(), "Chunk 2: 4096 bytes");
}

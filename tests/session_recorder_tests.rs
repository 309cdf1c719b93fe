// Integration tests for the session recorder
//
// These tests verify that frames are cut into periodic chunks in arrival
// order and that finalize produces one consistent artifact.

use anyhow::Result;
use capture_session::audio::{
    AudioFrame, AudioStreamSource, ChunkMeta, RecorderConfig, SessionRecorder, PCM_MIME_TYPE,
};
use capture_session::CaptureError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn recorder() -> SessionRecorder {
    recorder_with_interval(2000)
}

fn recorder_with_interval(interval_ms: u64) -> SessionRecorder {
    SessionRecorder::new(RecorderConfig {
        session_id: "test-session".to_string(),
        chunk_interval: Duration::from_millis(interval_ms),
        sample_rate: 16000,
        channels: 1,
    })
}

fn frame(sample_count: usize, value: i16, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![value; sample_count],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
        source: AudioStreamSource::Microphone,
    }
}

async fn drain(mut chunk_rx: mpsc::UnboundedReceiver<ChunkMeta>) -> Vec<ChunkMeta> {
    let mut chunks = Vec::new();
    while let Some(chunk) = chunk_rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test(start_paused = true)]
async fn test_three_chunks_over_six_seconds() -> Result<()> {
    let mut recorder = recorder();
    let (tx, rx) = mpsc::channel(16);
    let chunk_rx = recorder.begin(rx)?;

    // 4096 bytes, 4096 bytes, 2048 bytes, one per interval
    tx.send(frame(2048, 1, 0)).await?;
    sleep(Duration::from_millis(2000)).await;
    tx.send(frame(2048, 2, 2000)).await?;
    sleep(Duration::from_millis(2000)).await;
    tx.send(frame(1024, 3, 4000)).await?;
    sleep(Duration::from_millis(2000)).await;

    let artifact = recorder.finalize().await?;
    let chunks = drain(chunk_rx).await;

    assert_eq!(artifact.total_bytes, 10240);
    assert_eq!(artifact.bytes.len(), 10240);
    assert_eq!(artifact.chunk_count(), 3);
    assert_eq!(artifact.duration_ms, 6000);
    assert_eq!(artifact.mime_type, PCM_MIME_TYPE);

    let sizes: Vec<u64> = chunks.iter().map(|c| c.byte_size).collect();
    assert_eq!(sizes, vec![4096, 4096, 2048]);
    let sequence: Vec<u64> = chunks.iter().map(|c| c.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert_eq!(chunks, artifact.chunks);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_bytes_keep_arrival_order() -> Result<()> {
    let mut recorder = recorder();
    let (tx, rx) = mpsc::channel(16);
    let _chunk_rx = recorder.begin(rx)?;

    for (i, value) in [10i16, 20, 30, 40].into_iter().enumerate() {
        tx.send(frame(4, value, i as u64 * 1500)).await?;
        sleep(Duration::from_millis(1500)).await;
    }

    let artifact = recorder.finalize().await?;

    let samples: Vec<i16> = artifact
        .bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let expected: Vec<i16> = [10i16, 20, 30, 40]
        .iter()
        .flat_map(|v| std::iter::repeat(*v).take(4))
        .collect();
    assert_eq!(samples, expected);

    let total: u64 = artifact.chunks.iter().map(|c| c.byte_size).sum();
    assert_eq!(total, artifact.total_bytes);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pending_data_becomes_final_chunk() -> Result<()> {
    let mut recorder = recorder();
    let (tx, rx) = mpsc::channel(16);
    let chunk_rx = recorder.begin(rx)?;

    tx.send(frame(100, 1, 0)).await?;
    sleep(Duration::from_millis(500)).await;

    let artifact = recorder.finalize().await?;
    let chunks = drain(chunk_rx).await;

    assert_eq!(chunks.len(), 1, "Stop should flush the partial interval");
    assert_eq!(chunks[0].byte_size, 200);
    assert_eq!(chunks[0].offset_ms, 500);
    assert_eq!(artifact.duration_ms, 500);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording() -> Result<()> {
    let mut recorder = recorder();
    let (_tx, rx) = mpsc::channel::<AudioFrame>(16);
    let chunk_rx = recorder.begin(rx)?;

    sleep(Duration::from_millis(4500)).await;
    let artifact = recorder.finalize().await?;
    let chunks = drain(chunk_rx).await;

    // One empty delivery per elapsed interval, none for the stop
    let sizes: Vec<u64> = chunks.iter().map(|c| c.byte_size).collect();
    assert_eq!(sizes, vec![0, 0]);
    assert_eq!(artifact.total_bytes, 0);
    assert!(artifact.bytes.is_empty());
    assert_eq!(artifact.duration_ms, 4500);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_every_interval_delivers_a_chunk() -> Result<()> {
    let mut recorder = recorder_with_interval(500);
    let (tx, rx) = mpsc::channel(16);
    let chunk_rx = recorder.begin(rx)?;

    tx.send(frame(100, 1, 0)).await?;
    sleep(Duration::from_millis(2250)).await;

    let artifact = recorder.finalize().await?;
    let chunks = drain(chunk_rx).await;

    let sizes: Vec<u64> = chunks.iter().map(|c| c.byte_size).collect();
    assert_eq!(sizes, vec![200, 0, 0, 0]);
    let offsets: Vec<u64> = chunks.iter().map(|c| c.offset_ms).collect();
    assert_eq!(offsets, vec![500, 1000, 1500, 2000]);
    let sequence: Vec<u64> = chunks.iter().map(|c| c.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4]);
    assert_eq!(artifact.total_bytes, 200);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_source_ending_early_keeps_audio() -> Result<()> {
    let mut recorder = recorder();
    let (tx, rx) = mpsc::channel(16);
    let _chunk_rx = recorder.begin(rx)?;

    tx.send(frame(512, 7, 0)).await?;
    drop(tx);
    sleep(Duration::from_millis(3000)).await;

    let artifact = recorder.finalize().await?;

    assert_eq!(artifact.total_bytes, 1024);
    assert_eq!(artifact.chunk_count(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_finalize_twice_returns_same_artifact() -> Result<()> {
    let mut recorder = recorder();
    let (tx, rx) = mpsc::channel(16);
    let _chunk_rx = recorder.begin(rx)?;

    tx.send(frame(64, 1, 0)).await?;
    sleep(Duration::from_millis(100)).await;

    let first = recorder.finalize().await?;
    let second = recorder.finalize().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!recorder.is_running());

    Ok(())
}

#[tokio::test]
async fn test_finalize_before_begin_is_invalid() {
    let mut recorder = recorder();

    let result = recorder.finalize().await;

    assert!(matches!(result, Err(CaptureError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_begin_twice_is_invalid() -> Result<()> {
    let mut recorder = recorder();
    let (_tx1, rx1) = mpsc::channel::<AudioFrame>(4);
    let (_tx2, rx2) = mpsc::channel::<AudioFrame>(4);

    let _chunk_rx = recorder.begin(rx1)?;
    let second = recorder.begin(rx2);

    assert!(matches!(second, Err(CaptureError::InvalidTransition { .. })));
    recorder.finalize().await?;

    Ok(())
}

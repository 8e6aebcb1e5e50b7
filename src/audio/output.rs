//! Audio output to playback devices
//!
//! The output callback pulls chunks from a small bounded channel. Writers
//! block on that channel, which paces them to the device clock. When nothing
//! is queued the device plays silence.

use cpal::traits::DeviceTrait;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

use crate::audio::buffer::{sample_to_f32, AudioChunk};
use crate::audio::capture::{spawn_stream_thread, stream_config};
use crate::audio::device::{OutputStream, StreamParams};
use crate::constants::PLAYBACK_DEVICE_QUEUE;
use crate::error::AudioError;

/// Pulls samples out of queued chunks for the device callback
struct ChunkReader {
    chunks: mpsc::Receiver<AudioChunk>,
    current: AudioChunk,
    position: usize,
}

impl ChunkReader {
    fn new(chunks: mpsc::Receiver<AudioChunk>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            position: 0,
        }
    }

    /// Next sample, or `None` on underrun
    fn next_sample(&mut self) -> Option<i32> {
        while self.position >= self.current.len() {
            self.current = self.chunks.try_recv().ok()?;
            self.position = 0;
        }
        let sample = self.current[self.position];
        self.position += 1;
        Some(sample)
    }

    fn fill(&mut self, data: &mut [f32]) {
        for out in data.iter_mut() {
            *out = self.next_sample().map(sample_to_f32).unwrap_or(0.0);
        }
    }
}

/// Open a playback stream on `device`
pub fn open_output(device: cpal::Device, params: StreamParams) -> Result<OutputStream, AudioError> {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let (chunk_tx, chunk_rx) = mpsc::channel(PLAYBACK_DEVICE_QUEUE);
    let config = stream_config(&params);

    let guard = spawn_stream_thread("audio-playback".into(), move |running| {
        let mut reader = ChunkReader::new(chunk_rx);

        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| reader.fill(data),
                move |err| {
                    tracing::error!("Playback stream error: {}", err);
                    running.store(false, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceOpen(e.to_string()))
    })?;

    tracing::info!(
        "Audio playback started on {} ({} Hz, {} ch)",
        name,
        params.sample_rate,
        params.channels
    );
    Ok(OutputStream::new(chunk_tx, Box::new(guard)))
}

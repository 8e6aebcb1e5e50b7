//! Audio capture from input devices
//!
//! A cpal stream is not `Send`, so each stream is built, played and kept alive
//! on its own thread while a running flag is set. Captured samples are cut
//! into fixed-size chunks in the callback and handed over a bounded channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::buffer::{sample_to_i32, ChunkAssembler};
use crate::audio::device::{DeviceGuard, InputStream, StreamParams};
use crate::constants::CAPTURE_DEVICE_QUEUE;
use crate::error::AudioError;

/// Thread that owns a playing cpal stream
pub(crate) struct CpalStreamThread {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeviceGuard for CpalStreamThread {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalStreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build and play a stream on a dedicated thread.
///
/// `build` receives the running flag so its error callback can clear it,
/// which drops the stream and closes the chunk channel. Returns once the
/// stream is playing, or with the error that prevented it.
pub(crate) fn spawn_stream_thread<B>(name: String, build: B) -> Result<CpalStreamThread, AudioError>
where
    B: FnOnce(Arc<AtomicBool>) -> Result<cpal::Stream, AudioError> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_for_loop = running.clone();
    let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || {
            let stream = match build(running_for_loop.clone()) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::DeviceOpen(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep thread alive while running
            while running_for_loop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(10));
            }

            // Stream is dropped here, stopping the device
        })
        .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;

    let mut guard = CpalStreamThread {
        running,
        thread_handle: Some(handle),
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(guard),
        Ok(Err(e)) => {
            guard.stop();
            Err(e)
        }
        Err(_) => {
            guard.stop();
            Err(AudioError::DeviceOpen("stream thread exited".into()))
        }
    }
}

pub(crate) fn stream_config(params: &StreamParams) -> StreamConfig {
    StreamConfig {
        channels: params.channels,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Open a capture stream on `device`
pub fn open_input(device: cpal::Device, params: StreamParams) -> Result<InputStream, AudioError> {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let (chunk_tx, chunk_rx) = mpsc::channel(CAPTURE_DEVICE_QUEUE);
    let config = stream_config(&params);

    let guard = spawn_stream_thread("audio-capture".into(), move |running| {
        let mut assembler = ChunkAssembler::new(params.chunk_samples);
        let dropped = AtomicU64::new(0);

        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push(data.iter().copied().map(sample_to_i32), |chunk| {
                        // Consumer too slow: drop rather than block the device
                        if chunk_tx.try_send(chunk).is_err() {
                            let n = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            if n % 50 == 1 {
                                tracing::warn!("Capture queue full, {} chunks dropped", n);
                            }
                        }
                    });
                },
                move |err| {
                    tracing::error!("Capture stream error: {}", err);
                    running.store(false, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceOpen(e.to_string()))
    })?;

    tracing::info!(
        "Audio capture started on {} ({} Hz, {} ch, {} samples/chunk)",
        name,
        params.sample_rate,
        params.channels,
        params.chunk_samples
    );
    Ok(InputStream::new(chunk_rx, Box::new(guard)))
}

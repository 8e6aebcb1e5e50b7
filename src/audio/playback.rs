//! Inbound audio playback
//!
//! The dispatcher appends chunks with [`AudioPlayback::enqueue`]. The first
//! chunk after an idle period spawns a playback task that owns the output
//! device, plays the queue head to tail and exits once the queue is empty.
//! At most one playback task exists at a time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio::buffer::{AudioChunk, AudioChunkQueue};
use crate::audio::device::{AudioBackend, OutputStream, StreamParams};
use crate::constants::PLAYBACK_RETRY_BACKOFF;
use crate::error::AudioError;

struct PlaybackState {
    queue: AudioChunkQueue,
    /// Set after a device failure; chunks arriving before it are dropped
    disabled_until: Option<Instant>,
    chunks_played: u64,
    chunks_dropped: u64,
}

struct Shared {
    state: Mutex<PlaybackState>,
    backend: Arc<dyn AudioBackend>,
    params: StreamParams,
    cancel: CancellationToken,
}

/// Playback statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStats {
    pub active: bool,
    pub queued: usize,
    pub chunks_played: u64,
    pub chunks_dropped: u64,
}

/// Handle to the playback queue; clones share the same queue
#[derive(Clone)]
pub struct AudioPlayback {
    shared: Arc<Shared>,
}

impl AudioPlayback {
    pub fn new(backend: Arc<dyn AudioBackend>, params: StreamParams, cancel: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PlaybackState {
                    queue: AudioChunkQueue::new(),
                    disabled_until: None,
                    chunks_played: 0,
                    chunks_dropped: 0,
                }),
                backend,
                params,
                cancel,
            }),
        }
    }

    /// Append a chunk at the tail, starting playback if it is idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, chunk: AudioChunk) {
        let start = {
            let mut state = self.shared.state.lock();
            if let Some(until) = state.disabled_until {
                if Instant::now() < until {
                    state.chunks_dropped += 1;
                    return;
                }
                state.disabled_until = None;
            }
            state.queue.push(chunk)
        };

        if start {
            tokio::spawn(self.clone().run());
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.lock().queue.is_active()
    }

    pub fn stats(&self) -> PlaybackStats {
        let state = self.shared.state.lock();
        PlaybackStats {
            active: state.queue.is_active(),
            queued: state.queue.len(),
            chunks_played: state.chunks_played,
            chunks_dropped: state.chunks_dropped,
        }
    }

    async fn run(self) {
        let backend = self.shared.backend.clone();
        let params = self.shared.params;
        let opened = tokio::task::spawn_blocking(move || backend.open_output(params)).await;

        let mut output = match opened {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return self.disable(e),
            Err(e) => return self.disable(AudioError::DeviceOpen(e.to_string())),
        };

        tracing::debug!("Playback started");
        let played = self.play_queue(&mut output).await;
        output.close().await;
        match played {
            Ok(true) => tracing::debug!("Playback queue drained"),
            Ok(false) => {
                let discarded = self.shared.state.lock().queue.abort();
                tracing::debug!("Playback cancelled, {} chunks discarded", discarded);
            }
            Err(e) => self.disable(e),
        }
    }

    /// Play until the queue is empty (`Ok(true)`) or the session is cancelled (`Ok(false)`)
    async fn play_queue(&self, output: &mut OutputStream) -> Result<bool, AudioError> {
        let cancel = &self.shared.cancel;
        loop {
            let next = self.shared.state.lock().queue.pop();
            match next {
                Some(chunk) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        written = output.write(chunk) => written?,
                    }
                    self.shared.state.lock().chunks_played += 1;
                }
                None => {
                    // Let the device play out before giving it up; stay
                    // active meanwhile so no second task opens the device.
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        drained = output.drain() => drained?,
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        _ = tokio::time::sleep(self.shared.params.chunk_duration()) => {}
                    }
                    if self.shared.state.lock().queue.finish_if_empty() {
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn disable(&self, error: AudioError) {
        let mut state = self.shared.state.lock();
        let discarded = state.queue.abort();
        state.chunks_dropped += discarded as u64;
        state.disabled_until = Some(Instant::now() + PLAYBACK_RETRY_BACKOFF);
        tracing::warn!(
            "Audio playback disabled, {} chunks discarded: {}",
            discarded,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryAudioBackend;
    use std::time::Duration;

    async fn wait_idle(playback: &AudioPlayback) {
        for _ in 0..200 {
            if !playback.is_active() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("playback never went idle");
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_playback_task_is_send() {
        let playback = AudioPlayback::new(
            Arc::new(MemoryAudioBackend::new()),
            StreamParams::default(),
            CancellationToken::new(),
        );
        assert_send(playback.run());
    }

    #[tokio::test]
    async fn test_chunks_play_in_arrival_order() {
        let backend = MemoryAudioBackend::new();
        let playback = AudioPlayback::new(
            Arc::new(backend.clone()),
            StreamParams::default(),
            CancellationToken::new(),
        );

        for i in 0..5 {
            playback.enqueue(vec![i, i + 100]);
        }
        assert!(playback.is_active());
        wait_idle(&playback).await;

        assert_eq!(
            backend.played(),
            vec![vec![0, 100], vec![1, 101], vec![2, 102], vec![3, 103], vec![4, 104]]
        );
        assert_eq!(backend.outputs_opened(), 1);
        assert_eq!(playback.stats().chunks_played, 5);
    }

    #[tokio::test]
    async fn test_restarts_after_going_idle() {
        let backend = MemoryAudioBackend::new();
        let playback = AudioPlayback::new(
            Arc::new(backend.clone()),
            StreamParams::default(),
            CancellationToken::new(),
        );

        playback.enqueue(vec![1]);
        wait_idle(&playback).await;
        playback.enqueue(vec![2]);
        wait_idle(&playback).await;

        assert_eq!(backend.played(), vec![vec![1], vec![2]]);
        assert_eq!(backend.outputs_opened(), 2);
    }

    #[tokio::test]
    async fn test_open_failure_disables_playback_only() {
        let backend = MemoryAudioBackend::new();
        backend.fail_output_open();
        let playback = AudioPlayback::new(
            Arc::new(backend.clone()),
            StreamParams::default(),
            CancellationToken::new(),
        );

        playback.enqueue(vec![1]);
        playback.enqueue(vec![2]);
        wait_idle(&playback).await;

        // still inside the back-off window
        playback.enqueue(vec![3]);
        let stats = playback.stats();
        assert!(!stats.active);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.chunks_dropped, 3);
        assert!(backend.played().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_discards_queue_and_keeps_session() {
        let backend = MemoryAudioBackend::new();
        backend.break_output();
        let cancel = CancellationToken::new();
        let playback = AudioPlayback::new(Arc::new(backend.clone()), StreamParams::default(), cancel.clone());

        for i in 0..4 {
            playback.enqueue(vec![i]);
        }
        wait_idle(&playback).await;

        let stats = playback.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.chunks_played, 0);
        // the chunk whose write failed is lost with the device
        assert_eq!(stats.chunks_dropped, 3);
        assert_eq!(backend.outputs_opened(), 1);
        assert!(backend.played().is_empty());
        assert!(backend.all_stopped());
        assert!(!cancel.is_cancelled());

        // backing off: nothing reopens the broken device
        playback.enqueue(vec![9]);
        assert!(!playback.is_active());
        assert_eq!(backend.outputs_opened(), 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_queue() {
        let backend = MemoryAudioBackend::new();
        backend.pause_output();
        let cancel = CancellationToken::new();
        let playback = AudioPlayback::new(Arc::new(backend.clone()), StreamParams::default(), cancel.clone());

        for i in 0..10 {
            playback.enqueue(vec![i]);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        wait_idle(&playback).await;

        assert_eq!(playback.stats().queued, 0);
    }
}

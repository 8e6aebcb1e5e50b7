//! Audio chunk buffering
//!
//! [`ChunkAssembler`] cuts the device's variable-sized callback buffers into
//! fixed-size chunks. [`AudioChunkQueue`] is the FIFO between the inbound
//! dispatcher and the playback task.

use std::collections::VecDeque;

/// One fixed-size block of mono samples, the unit of audio transport
pub type AudioChunk = Vec<i32>;

/// Convert a device sample to wire format
pub fn sample_to_i32(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
}

/// Convert a wire sample to device format
pub fn sample_to_f32(sample: i32) -> f32 {
    (sample as f64 / i32::MAX as f64).clamp(-1.0, 1.0) as f32
}

/// Accumulates samples and emits chunks of exactly `chunk_samples`
pub struct ChunkAssembler {
    chunk_samples: usize,
    pending: AudioChunk,
}

impl ChunkAssembler {
    pub fn new(chunk_samples: usize) -> Self {
        let chunk_samples = chunk_samples.max(1);
        Self {
            chunk_samples,
            pending: Vec::with_capacity(chunk_samples),
        }
    }

    /// Feed samples; `emit` is called once per completed chunk
    pub fn push<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = i32>,
        F: FnMut(AudioChunk),
    {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.chunk_samples {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_samples));
                emit(full);
            }
        }
    }

    /// Samples waiting for the current chunk to fill
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// FIFO of chunks awaiting playback plus the "playback active" flag.
///
/// Chunks leave in exactly the order they arrived; nothing is reordered or
/// deduplicated. The owner wraps this in a lock so that appending, popping
/// and flipping the flag happen together.
#[derive(Debug, Default)]
pub struct AudioChunkQueue {
    chunks: VecDeque<AudioChunk>,
    active: bool,
}

impl AudioChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns true when the caller must start a playback task.
    pub fn push(&mut self, chunk: AudioChunk) -> bool {
        self.chunks.push_back(chunk);
        if self.active {
            false
        } else {
            self.active = true;
            true
        }
    }

    /// Take the head chunk
    pub fn pop(&mut self) -> Option<AudioChunk> {
        self.chunks.pop_front()
    }

    /// Mark playback idle if nothing is queued. Returns true when it went idle.
    pub fn finish_if_empty(&mut self) -> bool {
        if self.chunks.is_empty() {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Stop playback and discard whatever is queued
    pub fn abort(&mut self) -> usize {
        let discarded = self.chunks.len();
        self.chunks.clear();
        self.active = false;
        discarded
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_fixed_chunks() {
        let mut assembler = ChunkAssembler::new(4);
        let mut chunks = Vec::new();

        assembler.push(0..3, |c| chunks.push(c));
        assert!(chunks.is_empty());
        assembler.push(3..10, |c| chunks.push(c));

        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
        assert_eq!(assembler.pending(), 2);
    }

    #[test]
    fn test_queue_is_fifo_and_tracks_activity() {
        let mut queue = AudioChunkQueue::new();

        assert!(queue.push(vec![1]));
        assert!(!queue.push(vec![2]));
        assert!(!queue.push(vec![1]));
        assert!(queue.is_active());

        assert_eq!(queue.pop(), Some(vec![1]));
        assert_eq!(queue.pop(), Some(vec![2]));
        assert!(!queue.finish_if_empty());
        assert_eq!(queue.pop(), Some(vec![1]));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_active());

        assert!(queue.finish_if_empty());
        assert!(!queue.is_active());

        // next push restarts playback
        assert!(queue.push(vec![3]));
    }

    #[test]
    fn test_abort_discards_and_goes_idle() {
        let mut queue = AudioChunkQueue::new();
        queue.push(vec![1]);
        queue.push(vec![2]);

        assert_eq!(queue.abort(), 2);
        assert!(queue.is_empty());
        assert!(!queue.is_active());
    }

    #[test]
    fn test_sample_conversion_bounds() {
        assert_eq!(sample_to_i32(1.0), i32::MAX);
        assert_eq!(sample_to_i32(2.0), i32::MAX);
        assert_eq!(sample_to_i32(0.0), 0);
        assert_eq!(sample_to_f32(i32::MAX), 1.0);
        assert!(sample_to_f32(i32::MIN) >= -1.0);
    }
}

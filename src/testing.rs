//! In-memory devices for tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::buffer::AudioChunk;
use crate::audio::device::{AudioBackend, DeviceGuard, InputStream, OutputStream, StreamParams};
use crate::constants::PLAYBACK_DEVICE_QUEUE;
use crate::error::{AudioError, VideoError};
use crate::video::capture::{VideoDevice, VideoSource};
use crate::video::display::{Display, Key};
use crate::video::frame::Frame;

struct FlagGuard {
    stopped: Arc<AtomicBool>,
    // Held so a paused output keeps its channel open
    _sink: Option<mpsc::Receiver<AudioChunk>>,
    _source: Option<mpsc::Sender<AudioChunk>>,
}

impl DeviceGuard for FlagGuard {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryAudioState {
    played: Vec<AudioChunk>,
    outputs_opened: usize,
    inputs_opened: usize,
    fail_output: bool,
    fail_input: bool,
    /// Outputs open but reject every write
    broken_output: bool,
    paused: bool,
    input_script: Vec<AudioChunk>,
    /// Close the input after the script instead of going silent
    input_ends: bool,
    stopped: Vec<Arc<AtomicBool>>,
}

/// Audio backend that records playback and replays scripted capture
#[derive(Clone, Default)]
pub struct MemoryAudioBackend {
    state: Arc<Mutex<MemoryAudioState>>,
}

impl MemoryAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<AudioChunk> {
        self.state.lock().played.clone()
    }

    pub fn outputs_opened(&self) -> usize {
        self.state.lock().outputs_opened
    }

    pub fn inputs_opened(&self) -> usize {
        self.state.lock().inputs_opened
    }

    pub fn fail_output_open(&self) {
        self.state.lock().fail_output = true;
    }

    pub fn fail_input_open(&self) {
        self.state.lock().fail_input = true;
    }

    /// Outputs opened from now on fail on the first write
    pub fn break_output(&self) {
        self.state.lock().broken_output = true;
    }

    /// Outputs opened from now on never consume
    pub fn pause_output(&self) {
        self.state.lock().paused = true;
    }

    /// Chunks every new input stream delivers; with `then_end` the stream fails afterwards
    pub fn script_input(&self, chunks: Vec<AudioChunk>, then_end: bool) {
        let mut state = self.state.lock();
        state.input_script = chunks;
        state.input_ends = then_end;
    }

    /// True once every opened stream has been stopped
    pub fn all_stopped(&self) -> bool {
        self.state
            .lock()
            .stopped
            .iter()
            .all(|s| s.load(Ordering::SeqCst))
    }
}

impl AudioBackend for MemoryAudioBackend {
    fn open_input(&self, _params: StreamParams) -> Result<InputStream, AudioError> {
        let mut state = self.state.lock();
        if state.fail_input {
            return Err(AudioError::DeviceOpen("no microphone".into()));
        }
        state.inputs_opened += 1;

        let (tx, rx) = mpsc::channel(state.input_script.len().max(1));
        for chunk in &state.input_script {
            let _ = tx.try_send(chunk.clone());
        }
        let stopped = Arc::new(AtomicBool::new(false));
        state.stopped.push(stopped.clone());

        let guard = FlagGuard {
            stopped,
            _sink: None,
            _source: if state.input_ends { None } else { Some(tx) },
        };
        Ok(InputStream::new(rx, Box::new(guard)))
    }

    fn open_output(&self, _params: StreamParams) -> Result<OutputStream, AudioError> {
        let mut state = self.state.lock();
        if state.fail_output {
            return Err(AudioError::DeviceOpen("no speaker".into()));
        }
        state.outputs_opened += 1;

        let (tx, mut rx) = mpsc::channel(PLAYBACK_DEVICE_QUEUE);
        let stopped = Arc::new(AtomicBool::new(false));
        state.stopped.push(stopped.clone());

        let sink = if state.broken_output {
            drop(rx);
            None
        } else if state.paused {
            Some(rx)
        } else {
            let shared = self.state.clone();
            tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    shared.lock().played.push(chunk);
                }
            });
            None
        };

        let guard = FlagGuard {
            stopped,
            _sink: sink,
            _source: None,
        };
        Ok(OutputStream::new(tx, Box::new(guard)))
    }
}

#[derive(Default)]
struct ScriptedCameraState {
    opens: usize,
    fail_open: bool,
    /// Frames returned in order; once exhausted a blank 64x48 frame is returned
    frames: VecDeque<Option<Frame>>,
}

/// Camera whose frames and failures are set by the test
#[derive(Clone, Default)]
pub struct ScriptedCamera {
    state: Arc<Mutex<ScriptedCameraState>>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self) {
        self.state.lock().fail_open = true;
    }

    /// Queue a read result; `None` ends the stream
    pub fn push_read(&self, frame: Option<Frame>) {
        self.state.lock().frames.push_back(frame);
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }
}

struct ScriptedSource {
    state: Arc<Mutex<ScriptedCameraState>>,
}

impl VideoSource for ScriptedSource {
    fn read_frame(&mut self) -> Option<Frame> {
        self.state
            .lock()
            .frames
            .pop_front()
            .unwrap_or_else(|| Some(Frame::blank(64, 48)))
    }
}

impl VideoDevice for ScriptedCamera {
    fn open(&self, device_id: &str) -> Result<Box<dyn VideoSource>, VideoError> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(VideoError::DeviceOpen(format!("{}: busy", device_id)));
        }
        state.opens += 1;
        Ok(Box::new(ScriptedSource {
            state: self.state.clone(),
        }))
    }
}

/// Display fed with scripted keys that keeps the last frame shown
#[derive(Default)]
pub struct ScriptedDisplay {
    pub keys: VecDeque<Key>,
    pub shown: usize,
    pub last: Option<Frame>,
}

impl ScriptedDisplay {
    pub fn with_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Display for ScriptedDisplay {
    fn show(&mut self, frame: &Frame) -> Result<(), VideoError> {
        self.shown += 1;
        self.last = Some(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self, _timeout: Duration) -> Option<Key> {
        self.keys.pop_front()
    }
}

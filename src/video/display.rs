//! Frame presentation and key input
//!
//! The bundled [`TerminalDisplay`] is headless: it reads commands from stdin
//! on a dedicated thread and keeps the latest frame, writing it out as a PNG
//! when asked.

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};

use crate::error::VideoError;
use crate::video::frame::Frame;

/// Key events the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Quit
    Escape,
    /// Toggle broadcasting
    Space,
    Char(char),
}

impl Key {
    pub fn from_code(code: i32) -> Option<Key> {
        match code {
            27 => Some(Key::Escape),
            32 => Some(Key::Space),
            c => u32::try_from(c).ok().and_then(char::from_u32).map(Key::Char),
        }
    }
}

/// Presents frames and reports key presses
pub trait Display {
    fn show(&mut self, frame: &Frame) -> Result<(), VideoError>;

    /// Wait at most `timeout` for a key
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;
}

/// Headless display driven from stdin
pub struct TerminalDisplay {
    keys: Receiver<Key>,
    snapshot_path: PathBuf,
    snapshot_requested: bool,
    frames_shown: u64,
}

impl TerminalDisplay {
    /// Start reading commands from stdin
    pub fn new(snapshot_path: PathBuf) -> Result<Self, VideoError> {
        let (tx, rx) = unbounded();

        thread::Builder::new()
            .name("stdin-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if let Some(key) = parse_command(&line) {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| VideoError::Display(e.to_string()))?;

        println!("Commands: <enter> or b = toggle broadcast, s = snapshot, q = quit, or a key code (27, 32)");
        Ok(Self::from_channel(rx, snapshot_path))
    }

    /// Use an existing key source
    pub fn from_channel(keys: Receiver<Key>, snapshot_path: PathBuf) -> Self {
        Self {
            keys,
            snapshot_path,
            snapshot_requested: false,
            frames_shown: 0,
        }
    }

    fn write_snapshot(&self, frame: &Frame) -> Result<(), VideoError> {
        let img = frame
            .to_rgb_image()
            .ok_or_else(|| VideoError::Display("frame buffer size mismatch".into()))?;
        img.save(&self.snapshot_path)
            .map_err(|e| VideoError::Image(e.to_string()))?;
        tracing::info!("Saved snapshot to {}", self.snapshot_path.display());
        Ok(())
    }
}

impl Display for TerminalDisplay {
    fn show(&mut self, frame: &Frame) -> Result<(), VideoError> {
        self.frames_shown += 1;
        if self.frames_shown % 300 == 0 {
            tracing::debug!(
                "Presented {} frames ({}x{})",
                self.frames_shown,
                frame.width(),
                frame.height()
            );
        }

        if self.snapshot_requested {
            self.snapshot_requested = false;
            self.write_snapshot(frame)?;
        }
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        match self.keys.recv_timeout(timeout) {
            Ok(key) => {
                if key == Key::Char('s') {
                    self.snapshot_requested = true;
                }
                Some(key)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Map one line of stdin to a key
fn parse_command(line: &str) -> Option<Key> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "space" => Some(Key::Space),
        "q" | "quit" | "esc" => Some(Key::Escape),
        other => {
            if let Ok(code) = other.parse::<i32>() {
                return Key::from_code(code);
            }
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::Char(c)),
                _ => None,
            }
        }
    }
}

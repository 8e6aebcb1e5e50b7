//! Audio device enumeration and stream handles
//!
//! A stream is opened through an [`AudioBackend`] and comes back as an
//! [`InputStream`] or [`OutputStream`]. Reads and writes are async so callers
//! can race them against cancellation; the device itself lives behind a
//! [`DeviceGuard`] that is stopped on `stop()` or drop.

use cpal::traits::{DeviceTrait, HostTrait};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::buffer::AudioChunk;
use crate::constants::{CHANNELS, CHUNK_SAMPLES, SAMPLE_RATE};
use crate::error::AudioError;

/// Stream configuration shared by capture and playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per chunk (sample rate x chunk duration)
    pub chunk_samples: usize,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            chunk_samples: CHUNK_SAMPLES,
        }
    }
}

impl StreamParams {
    /// Play time of one chunk
    pub fn chunk_duration(&self) -> Duration {
        let frames = self.chunk_samples as f64 / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}

/// Keeps a device running until stopped
pub trait DeviceGuard: Send {
    /// Stop and release the device. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Opens audio streams
pub trait AudioBackend: Send + Sync {
    fn open_input(&self, params: StreamParams) -> Result<InputStream, AudioError>;
    fn open_output(&self, params: StreamParams) -> Result<OutputStream, AudioError>;
}

/// Capture stream delivering fixed-size chunks
pub struct InputStream {
    chunks: mpsc::Receiver<AudioChunk>,
    guard: Box<dyn DeviceGuard>,
}

impl InputStream {
    pub fn new(chunks: mpsc::Receiver<AudioChunk>, guard: Box<dyn DeviceGuard>) -> Self {
        Self { chunks, guard }
    }

    /// Wait for the next chunk. Fails once the device has stopped.
    pub async fn read(&mut self) -> Result<AudioChunk, AudioError> {
        self.chunks
            .recv()
            .await
            .ok_or_else(|| AudioError::DeviceIo("input stream ended".into()))
    }

    pub fn stop(&mut self) {
        self.guard.stop();
    }

    /// Stop the device from the blocking pool; a stop can join the device thread
    pub async fn close(mut self) {
        let _ = tokio::task::spawn_blocking(move || self.stop()).await;
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.guard.stop();
    }
}

/// Playback stream accepting chunks
pub struct OutputStream {
    chunks: mpsc::Sender<AudioChunk>,
    guard: Box<dyn DeviceGuard>,
}

impl OutputStream {
    pub fn new(chunks: mpsc::Sender<AudioChunk>, guard: Box<dyn DeviceGuard>) -> Self {
        Self { chunks, guard }
    }

    /// Hand one chunk to the device, waiting while its queue is full
    pub async fn write(&mut self, chunk: AudioChunk) -> Result<(), AudioError> {
        self.chunks
            .send(chunk)
            .await
            .map_err(|_| AudioError::DeviceIo("output stream closed".into()))
    }

    /// Wait until the device has taken every queued chunk
    pub async fn drain(&mut self) -> Result<(), AudioError> {
        let depth = self.chunks.max_capacity();
        self.chunks
            .reserve_many(depth)
            .await
            .map(drop)
            .map_err(|_| AudioError::DeviceIo("output stream closed".into()))
    }

    pub fn stop(&mut self) {
        self.guard.stop();
    }

    /// Stop the device from the blocking pool; a stop can join the device thread
    pub async fn close(mut self) {
        let _ = tokio::task::spawn_blocking(move || self.stop()).await;
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.guard.stop();
    }
}

/// Backend used when audio is disabled: every open fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn open_input(&self, _params: StreamParams) -> Result<InputStream, AudioError> {
        Err(AudioError::DeviceOpen("audio disabled".into()))
    }

    fn open_output(&self, _params: StreamParams) -> Result<OutputStream, AudioError> {
        Err(AudioError::DeviceOpen("audio disabled".into()))
    }
}

/// Backend over the system's default cpal host
#[derive(Debug, Default, Clone)]
pub struct CpalBackend {
    /// Input device id (see [`list_devices`]); default device when unset
    pub input_device: Option<String>,
    /// Output device id; default device when unset
    pub output_device: Option<String>,
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, params: StreamParams) -> Result<InputStream, AudioError> {
        let device = match &self.input_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_input_device()?,
        };
        crate::audio::capture::open_input(device, params)
    }

    fn open_output(&self, params: StreamParams) -> Result<OutputStream, AudioError> {
        let device = match &self.output_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_output_device()?,
        };
        crate::audio::output::open_output(device, params)
    }
}

/// Description of one audio device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                devices.push(AudioDeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                devices.push(AudioDeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_output_name.as_ref() == Some(&name),
                    name,
                    is_input: false,
                    is_output: true,
                });
            }
        }
    }

    devices
}

/// Get a device by its `input:<name>` or `output:<name>` id
pub fn get_device_by_id(id: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    let (is_input, name) = if let Some(name) = id.strip_prefix("input:") {
        (true, name)
    } else if let Some(name) = id.strip_prefix("output:") {
        (false, name)
    } else {
        return Err(AudioError::DeviceNotFound(id.to_string()));
    };

    let devices: Vec<cpal::Device> = if is_input {
        host.input_devices().map(Iterator::collect)
    } else {
        host.output_devices().map(Iterator::collect)
    }
    .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}

/// Get default input device
pub fn get_default_input_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
}

/// Get default output device
pub fn get_default_output_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}

//! Audio subsystem: device streams, chunking and the playback queue

pub mod buffer;
pub mod capture;
pub mod device;
pub mod output;
pub mod playback;

pub use buffer::{AudioChunk, AudioChunkQueue, ChunkAssembler};
pub use device::{
    list_devices, AudioBackend, AudioDeviceInfo, CpalBackend, DeviceGuard, InputStream,
    NullAudioBackend, OutputStream, StreamParams,
};
pub use playback::{AudioPlayback, PlaybackStats};

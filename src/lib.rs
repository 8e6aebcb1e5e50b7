//! # LAN Intercom
//!
//! Client side of a two-way, low-latency video and audio intercom.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              INTERCOM CLIENT                                 │
//! │                                                                              │
//! │   TCP (length-delimited bincode frames)                                      │
//! │        │                                              ▲                      │
//! │        ▼                                              │                      │
//! │  ┌──────────────────┐                       ┌──────────────────┐            │
//! │  │ Inbound          │                       │ Outbound writer  │            │
//! │  │ Dispatcher task  │                       │ task (single     │            │
//! │  │ (session::       │                       │ owner of socket) │            │
//! │  │  dispatcher)     │                       └────────▲─────────┘            │
//! │  └───┬─────────┬────┘                                │ bounded queue        │
//! │      │ image   │ audio                      ┌────────┴─────────┐            │
//! │      ▼         ▼                            │ Media Publisher  │            │
//! │  ┌────────┐ ┌──────────────┐                │  video step ◄────┼── camera   │
//! │  │Inbound │ │ Audio chunk  │                │  audio task ◄────┼── mic      │
//! │  │preview │ │ FIFO queue   │                └────────┬─────────┘            │
//! │  └───┬────┘ └──────┬───────┘                         │ outbound preview     │
//! │      │             ▼                                 │ (mirrored)           │
//! │      │      ┌──────────────┐                         │                      │
//! │      │      │ Playback task│──► speaker              │                      │
//! │      │      └──────────────┘                         │                      │
//! │      ▼                                               ▼                      │
//! │  ┌─────────────────────────────────────────────────────────────────────┐    │
//! │  │        Session Controller (main thread, one tick per render)        │    │
//! │  │   poll key ─► flags ─► publisher step ─► Compositor ─► Display      │    │
//! │  └─────────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All cross-task flags live in [`session::Session`], behind a single lock.

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Display (background) width in pixels
    pub const SCREEN_WIDTH: u32 = 1280 / 2;

    /// Display (background) height in pixels
    pub const SCREEN_HEIGHT: u32 = 720 / 2;

    /// Width the inbound preview is scaled to
    pub const INBOUND_PREVIEW_WIDTH: u32 = SCREEN_WIDTH / 2;

    /// Top-left corner (row, column) of the inbound preview on the display
    pub const INBOUND_PREVIEW_ORIGIN: (u32, u32) = (
        SCREEN_HEIGHT / 2 - SCREEN_HEIGHT / 4 - SCREEN_HEIGHT / 8,
        SCREEN_WIDTH / 2 - SCREEN_WIDTH / 4 - SCREEN_WIDTH / 8,
    );

    /// Width the outbound (self-view) preview is scaled to
    pub const OUTBOUND_PREVIEW_WIDTH: u32 = SCREEN_WIDTH / 4;

    /// Top-left corner (row, column) of the outbound preview on the display
    pub const OUTBOUND_PREVIEW_ORIGIN: (u32, u32) = (
        SCREEN_HEIGHT - SCREEN_HEIGHT / 4 - SCREEN_HEIGHT / 16,
        SCREEN_WIDTH - SCREEN_WIDTH / 4 - SCREEN_WIDTH / 16,
    );

    /// Audio sample rate for capture and playback
    pub const SAMPLE_RATE: u32 = 44_100;

    /// Audio channel count (mono)
    pub const CHANNELS: u16 = 1;

    /// Duration of one audio chunk in seconds
    pub const CHUNK_SECONDS: f64 = 0.1;

    /// Samples per audio chunk
    pub const CHUNK_SAMPLES: usize = (SAMPLE_RATE as f64 * CHUNK_SECONDS) as usize;

    /// Longest gap before inbound video is considered ended
    pub const LIVENESS_WINDOW: Duration = Duration::from_millis(300);

    /// Input poll timeout per render tick
    pub const INPUT_POLL: Duration = Duration::from_millis(1);

    /// Default relay address
    pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:6000";

    /// Default capture device
    pub const DEFAULT_DEVICE_ID: &str = "0";

    /// Largest accepted wire frame
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

    /// Capacity of the outbound message queue
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 32;

    /// Chunks the output device may hold before writes block
    pub const PLAYBACK_DEVICE_QUEUE: usize = 2;

    /// Chunks the input device may hold before new ones are dropped
    pub const CAPTURE_DEVICE_QUEUE: usize = 8;

    /// How long playback stays disabled after a device failure
    pub const PLAYBACK_RETRY_BACKOFF: Duration = Duration::from_secs(2);
}

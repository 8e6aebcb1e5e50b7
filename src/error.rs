//! Error types for the intercom client

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error ends the session.
    ///
    /// Only failing to connect and failures of the inbound stream are fatal;
    /// everything else degrades a single feature.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_fatal(),
            Error::Config(_) | Error::Io(_) => true,
            Error::Audio(_) | Error::Video(_) => false,
        }
    }
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Stream failed: {0}")]
    Stream(String),

    #[error("Send failed: {0}")]
    Send(String),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Send(_))
    }
}

/// Audio device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    DeviceOpen(String),

    #[error("Device I/O failed: {0}")]
    DeviceIo(String),
}

/// Video errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VideoError {
    #[error("Cannot decode image: {0}")]
    Decode(String),

    #[error("Failed to open capture device: {0}")]
    DeviceOpen(String),

    #[error("Capture device I/O failed: {0}")]
    DeviceIo(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Image error: {0}")]
    Image(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

//! Configuration loading
//!
//! Settings come from a TOML file. Every field has a default, so a partial
//! file (or none at all) is fine. Positional command-line arguments override
//! the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_DEVICE_ID, DEFAULT_SERVER_ADDR, SAMPLE_RATE};
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "INTERCOM_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Relay address as `host:port`
    pub server_addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Capture device id; `test-pattern` selects the synthetic camera
    pub device_id: String,
    /// Background image, resized to the screen. Black when unset.
    pub background: Option<PathBuf>,
    /// Where the `s` key writes the displayed frame
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// With audio off, microphone and playback stay disabled
    pub enabled: bool,
    /// Input device id from the device list; system default when unset
    pub input_device: Option<String>,
    /// Output device id from the device list; system default when unset
    pub output_device: Option<String>,
    pub sample_rate: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            background: None,
            snapshot_path: PathBuf::from("intercom-snapshot.png"),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_device: None,
            output_device: None,
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl AppConfig {
    /// Load from `$INTERCOM_CONFIG`, else the per-user config file, else defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "lan-intercom")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply positional arguments: server address, capture device, background image
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        if let Some(addr) = args.next() {
            self.network.server_addr = addr;
        }
        if let Some(device) = args.next() {
            self.video.device_id = device;
        }
        if let Some(background) = args.next() {
            self.video.background = Some(PathBuf::from(background));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.server_addr.is_empty() {
            return Err(Error::Config("server_addr must not be empty".into()));
        }
        if self.video.device_id.is_empty() {
            return Err(Error::Config("device_id must not be empty".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".into()));
        }
        Ok(())
    }
}

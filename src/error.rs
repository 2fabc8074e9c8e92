//! Error types shared across the radio modules.

use std::io;
use thiserror::Error;

/// Errors raised while addressing the MCP3008.
#[derive(Debug, Error)]
pub enum AdcError {
    #[error("ADC channel must be 0-7, got {0}")]
    InvalidChannel(u8),
}

/// Errors raised while reading the front panel.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("panel fault: {0}")]
    Fault(String),
}

/// Errors raised by a playback backend.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to start player process: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to stop player process: {0}")]
    Kill(#[source] io::Error),

    #[error("player IPC error: {0}")]
    Ipc(#[source] io::Error),

    #[error("failed to encode player command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while loading, saving or editing the station list.
#[derive(Debug, Error)]
pub enum StationError {
    #[error("station file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("station file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid station range {min}..{max} for '{url}'")]
    InvalidRange { min: f64, max: f64, url: String },

    #[error("station index {index} out of range ({len} stations)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors raised while loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A fault during one control loop iteration. Always transient.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("panel read failed: {0}")]
    Panel(#[from] PanelError),

    #[error("playback command failed: {0}")]
    Player(#[from] PlayerError),
}

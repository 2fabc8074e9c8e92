use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// What the control loop knows about the radio. Owned by the loop and only
/// changed inside a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub power_on: bool,
    pub current_source: Option<String>, // Stream URL or fallback file path
    pub last_tuner: f64,
    pub last_volume: f64,
}

/// Snapshot of the radio published after every tick for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioStatus {
    pub power_on: bool,
    pub tuner: f64,
    pub volume: f64,
    pub current_source: Option<String>,
    pub station_title: Option<String>,
    /// Title reported by the playing stream, if any.
    pub track_title: Option<String>,
    pub playing_static: bool,
    pub last_event: String,
    pub timestamp_ms: i64,
}

/// Latest status, written by the control loop and read by the status feed.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<Option<RadioStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        StatusBoard::default()
    }

    pub fn publish(&self, status: RadioStatus) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub fn latest(&self) -> Option<RadioStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

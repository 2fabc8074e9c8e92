//! The radio's control loop.
//!
//! Every tick reads the front panel, follows power switch changes, keeps the
//! volume in step with the dial and plays whichever station the tuner points
//! at, or the static fallback when it points at nothing.

use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::TickError;
use crate::panel::{Panel, PanelReading};
use crate::player::Player;
use crate::shutdown::Shutdown;
use crate::state::{ControllerState, RadioStatus, StatusBoard};
use crate::stations::{SharedStations, StationRange};

/// Pause after a failed tick before trying again.
pub const FAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    PowerOn,
    PowerOff,
    Tuned { url: String },
    Static,
}

impl fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioEvent::PowerOn => write!(f, "POWER ON"),
            RadioEvent::PowerOff => write!(f, "POWER OFF"),
            RadioEvent::Tuned { url } => write!(f, "TUNED {}", url),
            RadioEvent::Static => write!(f, "STATIC"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub poll_interval: Duration,
    pub fault_backoff: Duration,
    /// Local file played when no station matches.
    pub fallback: PathBuf,
    /// Log a status line about once a second.
    pub verbose: bool,
}

impl ControlSettings {
    pub fn new(poll_interval: Duration, fallback: PathBuf, verbose: bool) -> Self {
        ControlSettings {
            poll_interval,
            fault_backoff: FAULT_BACKOFF,
            fallback,
            verbose,
        }
    }
}

pub struct ControlLoop<P: Panel, A: Player> {
    panel: P,
    player: A,
    stations: SharedStations,
    settings: ControlSettings,
    status: StatusBoard,
    state: ControllerState,
    last_event: String,
}

impl<P: Panel, A: Player> ControlLoop<P, A> {
    pub fn new(
        panel: P,
        player: A,
        stations: SharedStations,
        settings: ControlSettings,
        status: StatusBoard,
    ) -> Self {
        ControlLoop {
            panel,
            player,
            stations,
            settings,
            status,
            state: ControllerState::default(),
            last_event: String::from("--"),
        }
    }

    /// Poll until `shutdown` fires. A failing tick is logged and retried
    /// after the fault backoff; playback is stopped on the way out.
    pub fn run(&mut self, shutdown: &Shutdown) {
        tracing::info!(
            "Control loop running every {} ms, fallback {}",
            self.settings.poll_interval.as_millis(),
            self.settings.fallback.display()
        );

        while !shutdown.is_triggered() {
            let pause = match self.tick() {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    tracing::error!("Error in control loop: {}", e);
                    self.settings.fault_backoff
                }
            };
            if shutdown.sleep(pause) {
                break;
            }
        }

        if let Err(e) = self.player.stop() {
            tracing::warn!("Failed to stop playback on shutdown: {}", e);
        }
        tracing::info!("Control loop stopped");
    }

    /// One pass of the state machine.
    pub fn tick(&mut self) -> Result<Vec<RadioEvent>, TickError> {
        let reading = self.panel.read()?;
        self.state.last_tuner = reading.tuner;
        self.state.last_volume = reading.volume;

        let mut events = Vec::new();

        if reading.power != self.state.power_on {
            if reading.power {
                tracing::info!("Power ON");
                self.state.power_on = true;
                events.push(RadioEvent::PowerOn);
            } else {
                tracing::info!("Power OFF");
                // state only changes once playback has really stopped, so a
                // failed stop is retried on the next tick
                self.player.stop()?;
                self.state.power_on = false;
                self.state.current_source = None;
                events.push(RadioEvent::PowerOff);
            }
        }

        let stations = self.stations.snapshot();
        let station = stations.lookup(reading.tuner);

        if self.state.power_on {
            self.player.set_volume(reading.volume)?;

            match station {
                Some(station) => {
                    if self.state.current_source.as_deref() != Some(station.url.as_str()) {
                        tracing::info!("Tuning to station: {}", station.url);
                        self.player.play_stream(&station.url)?;
                        self.state.current_source = Some(station.url.clone());
                        events.push(RadioEvent::Tuned { url: station.url.clone() });
                    }
                }
                None => {
                    let fallback = self.fallback_source();
                    if self.state.current_source.as_deref() != Some(fallback.as_str()) {
                        tracing::info!("No station matched. Playing static.");
                        self.player.play_local(&self.settings.fallback, true)?;
                        self.state.current_source = Some(fallback);
                        events.push(RadioEvent::Static);
                    }
                }
            }

            if self.settings.verbose
                && status_due(Local::now().timestamp_subsec_millis(), self.settings.poll_interval)
            {
                tracing::info!("{}", status_line(&reading, stations.lookup_url(reading.tuner)));
            }
        }

        if let Some(event) = events.last() {
            self.note(event);
        }
        self.publish(&reading, station);

        Ok(events)
    }

    fn fallback_source(&self) -> String {
        self.settings.fallback.to_string_lossy().into_owned()
    }

    fn note(&mut self, event: &RadioEvent) {
        self.last_event = event.to_string();
    }

    fn publish(&mut self, reading: &PanelReading, station: Option<&StationRange>) {
        let playing_static = self.state.power_on && station.is_none();
        let track_title = if self.state.power_on { self.player.track_title() } else { None };
        self.status.publish(RadioStatus {
            power_on: self.state.power_on,
            tuner: reading.tuner,
            volume: reading.volume,
            current_source: self.state.current_source.clone(),
            station_title: station.and_then(|s| s.title.clone()),
            track_title,
            playing_static,
            last_event: self.last_event.clone(),
            timestamp_ms: Local::now().timestamp_millis(),
        });
    }
}

/// Best effort once-a-second cadence: true during the first poll interval
/// of each wall-clock second.
pub fn status_due(subsec_millis: u32, poll_interval: Duration) -> bool {
    u128::from(subsec_millis % 1000) < poll_interval.as_millis()
}

pub fn status_line(reading: &PanelReading, station_url: Option<&str>) -> String {
    let station_info = match station_url {
        Some(url) => format!("Station: {}", url),
        None => String::from("Static"),
    };
    format!(
        "Power: {}  Tuner: {:.1}  Volume: {:.1}  {}",
        reading.power, reading.tuner, reading.volume, station_info
    )
}

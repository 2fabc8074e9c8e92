use rppal::gpio::Level;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adc::BitBangTiming;
use crate::error::ConfigError;

/// BCM pin numbers of the front panel wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub power: u8,        // Power switch, active low with pull-up
    pub clock: u8,        // SPI clock
    pub mosi: u8,         // SPI data out (to ADC DIN)
    pub miso: u8,         // SPI data in (from ADC DOUT)
    pub chip_select: u8,  // ADC CS/SHDN
}

impl Default for PinConfig {
    fn default() -> Self {
        PinConfig {
            power: 17,
            clock: 11,
            mosi: 10,
            miso: 9,
            chip_select: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub half_period_us: u64,
    pub chip_select_active_low: bool,
    pub clock_idle_high: bool,
}

impl Default for AdcConfig {
    fn default() -> Self {
        AdcConfig {
            half_period_us: 1000,
            chip_select_active_low: true,
            clock_idle_high: false,
        }
    }
}

impl AdcConfig {
    pub fn timing(&self) -> BitBangTiming {
        BitBangTiming {
            half_period: Duration::from_micros(self.half_period_us),
            chip_select_active: if self.chip_select_active_low { Level::Low } else { Level::High },
            clock_idle: if self.clock_idle_high { Level::High } else { Level::Low },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub program: String,
    pub ipc_socket: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            program: String::from("mpv"),
            ipc_socket: PathBuf::from("/tmp/ghostradio-mpv.sock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            enabled: true,
            bind: String::from("0.0.0.0:10013"),
        }
    }
}

/// Everything the radio reads from `config.json`. Missing fields fall back
/// to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub pins: PinConfig,
    pub adc: AdcConfig,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub stations_path: PathBuf,
    pub static_file: PathBuf,
    pub player: PlayerConfig,
    pub status: StatusConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            pins: PinConfig::default(),
            adc: AdcConfig::default(),
            poll_interval_ms: 50,
            debounce_ms: 50,
            stations_path: PathBuf::from("stations.json"),
            static_file: PathBuf::from("static.wav"),
            player: PlayerConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl RadioConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: RadioConfig = serde_json::from_str(
            r#"{ "poll_interval_ms": 20, "pins": { "power": 4 }, "adc": { "clock_idle_high": true } }"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.pins.power, 4);
        assert_eq!(config.pins.clock, 11);
        assert_eq!(config.static_file, PathBuf::from("static.wav"));

        let timing = config.adc.timing();
        assert_eq!(timing.clock_idle, Level::High);
        assert_eq!(timing.chip_select_active, Level::Low);
        assert_eq!(timing.half_period, Duration::from_millis(1));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RadioConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, RadioConfig::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RadioConfig::load_or_default(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = RadioConfig::default();
        config.debounce_ms = 0;
        config.status.enabled = false;
        config.save(&path).unwrap();
        assert_eq!(RadioConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = RadioConfig { poll_interval_ms: 0, ..RadioConfig::default() };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rppal::gpio::Gpio;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::adc::{Channel, GpioLines, Mcp3008};
use crate::config::RadioConfig;
use crate::error::PanelError;
use crate::signal::{tuner_percentage, volume_percentage};
use crate::switch::PowerSwitch;

/// One conditioned reading of the three front panel controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelReading {
    pub power: bool,
    pub tuner: f64,
    pub volume: f64,
}

pub trait Panel {
    fn read(&mut self) -> Result<PanelReading, PanelError>;
}

/// The real front panel: power switch on a GPIO input, both dials on the
/// bit-banged MCP3008.
pub struct GpioPanel {
    power: PowerSwitch,
    adc: Mcp3008<GpioLines>,
}

impl GpioPanel {
    pub fn new(config: &RadioConfig) -> Result<Self, PanelError> {
        let gpio = Gpio::new()?;
        let power = PowerSwitch::new(&gpio, config.pins.power, config.debounce())?;
        let lines = GpioLines::new(&gpio, &config.pins)?;
        let adc = Mcp3008::new(lines, config.adc.timing());
        tracing::info!("MCP3008 ADC initialized (software SPI)");
        Ok(GpioPanel { power, adc })
    }
}

impl Panel for GpioPanel {
    fn read(&mut self) -> Result<PanelReading, PanelError> {
        let power = self.power.read();
        let tuner_raw = self.adc.read(Channel::TUNER);
        let volume_raw = self.adc.read(Channel::VOLUME);
        tracing::trace!(
            "ADC ch{} tuner={} ch{} volume={}",
            Channel::TUNER.index(),
            tuner_raw.value(),
            Channel::VOLUME.index(),
            volume_raw.value()
        );

        Ok(PanelReading {
            power,
            tuner: tuner_percentage(tuner_raw),
            volume: volume_percentage(volume_raw),
        })
    }
}

/// Settable panel values, shared between the simulated panel and whoever
/// drives it (the status feed).
#[derive(Debug, Clone)]
pub struct PanelControls {
    inner: Arc<Mutex<PanelReading>>,
}

impl PanelControls {
    pub fn new(initial: PanelReading) -> Self {
        PanelControls { inner: Arc::new(Mutex::new(initial)) }
    }

    pub fn set_power(&self, power: bool) {
        self.lock().power = power;
    }

    pub fn set_tuner(&self, tuner: f64) {
        self.lock().tuner = tuner.clamp(0.0, 100.0);
    }

    pub fn set_volume(&self, volume: f64) {
        self.lock().volume = volume.clamp(0.0, 100.0);
    }

    pub fn get(&self) -> PanelReading {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PanelReading> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

const DRIFT_PERIOD: Duration = Duration::from_secs(2);

/// Stand-in panel for running without hardware. Values come from
/// `PanelControls`; with drift enabled both dials wander slowly as if
/// someone were turning them.
pub struct SimulatedPanel {
    controls: PanelControls,
    drift: Option<StdRng>,
    last_drift: Instant,
}

impl SimulatedPanel {
    pub fn new(drift: bool) -> Self {
        let controls = PanelControls::new(PanelReading { power: true, tuner: 50.0, volume: 75.0 });
        if drift {
            tracing::info!("Simulated panel: dials drift slowly");
        } else {
            tracing::info!("Simulated panel: set values through the status feed");
        }
        SimulatedPanel {
            controls,
            drift: drift.then(StdRng::from_entropy),
            last_drift: Instant::now(),
        }
    }

    pub fn controls(&self) -> PanelControls {
        self.controls.clone()
    }

    fn apply_drift(&mut self) {
        let Some(rng) = self.drift.as_mut() else {
            return;
        };
        if self.last_drift.elapsed() < DRIFT_PERIOD {
            return;
        }
        self.last_drift = Instant::now();

        let current = self.controls.get();
        self.controls.set_tuner(current.tuner + rng.gen_range(-1.0..1.0));
        self.controls.set_volume(current.volume + rng.gen_range(-1.5..1.5));
    }
}

impl Panel for SimulatedPanel {
    fn read(&mut self) -> Result<PanelReading, PanelError> {
        self.apply_drift();
        Ok(self.controls.get())
    }
}

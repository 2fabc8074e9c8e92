//! Conditioning of raw ADC samples into dial percentages.

/// Full-scale reading of a 10-bit converter.
pub const FULL_SCALE: f64 = RawSample::MAX.0 as f64;

// Volume curve calibration
const VOLUME_LINEAR_KNEE: f64 = 90.0;
const VOLUME_CURVE_EXPONENT: f64 = 0.15;
const VOLUME_DEAD_ZONE: f64 = 30.0;

/// A single 10-bit conversion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawSample(u16);

impl RawSample {
    pub const MAX: RawSample = RawSample(0x3FF);

    /// Bits above the 10-bit result are dropped.
    pub fn new(value: u16) -> Self {
        RawSample(value & Self::MAX.0)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Linear position of a dial, 0 to 100.
pub fn percentage(raw: RawSample) -> f64 {
    f64::from(raw.value()) / FULL_SCALE * 100.0
}

/// The tuning dial is mounted reversed, so its reading is inverted.
pub fn tuner_percentage(raw: RawSample) -> f64 {
    100.0 - percentage(raw)
}

/// Volume dial position mapped through the loudness curve.
pub fn volume_percentage(raw: RawSample) -> f64 {
    volume_curve(percentage(raw))
}

/// Perceptual volume curve applied to a linear dial percentage.
///
/// The top of the range stays linear so the dial can reach full volume.
/// Below the knee a strong power law lifts small movements so the radio
/// becomes audible early, and anything that would land under the dead zone
/// is muted outright.
pub fn volume_curve(linear: f64) -> f64 {
    if linear >= VOLUME_LINEAR_KNEE {
        return linear.min(100.0);
    }

    let normalized = linear.max(0.0) / VOLUME_LINEAR_KNEE;
    let scaled = normalized.powf(VOLUME_CURVE_EXPONENT) * VOLUME_LINEAR_KNEE;
    if scaled < VOLUME_DEAD_ZONE { 0.0 } else { scaled }
}

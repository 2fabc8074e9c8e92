use rppal::gpio::{Gpio, InputPin, Level};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Accepts a new level only after it has been stable for the debounce window.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    current: bool,
    last_stable: bool,
    last_change: Instant,
}

impl Debounce {
    pub fn new(window: Duration, initial: bool, now: Instant) -> Self {
        Debounce {
            window,
            current: initial,
            last_stable: initial,
            last_change: now,
        }
    }

    pub fn update(&mut self, level: bool, now: Instant) -> Option<Edge> {
        if level != self.current {
            self.current = level;
            self.last_change = now;
            if !self.window.is_zero() {
                return None;
            }
        }

        if now.duration_since(self.last_change) >= self.window && self.current != self.last_stable {
            self.last_stable = self.current;
            return Some(if self.current { Edge::Rising } else { Edge::Falling });
        }

        None
    }

    pub fn stable(&self) -> bool {
        self.last_stable
    }
}

/// Front panel power switch. Wired to ground when on, so the input uses the
/// internal pull-up and reads low when the radio is switched on.
pub struct PowerSwitch {
    pin: InputPin,
    debounce: Debounce,
}

impl PowerSwitch {
    pub fn new(gpio: &Gpio, pin_number: u8, window: Duration) -> Result<Self, rppal::gpio::Error> {
        let pin = gpio.get(pin_number)?.into_input_pullup();
        tracing::info!("Power switch on GPIO {} (active low)", pin_number);
        Ok(PowerSwitch {
            pin,
            debounce: Debounce::new(window, false, Instant::now()),
        })
    }

    pub fn read(&mut self) -> bool {
        let on = self.pin.read() == Level::Low;
        if let Some(edge) = self.debounce.update(on, Instant::now()) {
            tracing::debug!("Power switch edge {:?}", edge);
        }
        self.debounce.stable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn level_must_hold_for_the_window() {
        let start = Instant::now();
        let mut debounce = Debounce::new(WINDOW, false, start);

        assert_eq!(debounce.update(true, start + Duration::from_millis(10)), None);
        assert_eq!(debounce.update(true, start + Duration::from_millis(40)), None);
        assert!(!debounce.stable());
        assert_eq!(debounce.update(true, start + Duration::from_millis(60)), Some(Edge::Rising));
        assert!(debounce.stable());
        assert_eq!(debounce.update(true, start + Duration::from_millis(200)), None);
    }

    #[test]
    fn bounces_are_ignored() {
        let start = Instant::now();
        let mut debounce = Debounce::new(WINDOW, false, start);
        let mut at = start;

        for level in [true, false, true, false, true, false] {
            at += Duration::from_millis(5);
            assert_eq!(debounce.update(level, at), None);
        }
        at += Duration::from_millis(100);
        assert_eq!(debounce.update(false, at), None);
        assert!(!debounce.stable());
    }

    #[test]
    fn falling_edge_after_release() {
        let start = Instant::now();
        let mut debounce = Debounce::new(WINDOW, true, start);

        debounce.update(false, start + Duration::from_millis(1));
        assert_eq!(debounce.update(false, start + Duration::from_millis(51)), Some(Edge::Falling));
        assert!(!debounce.stable());
    }

    #[test]
    fn zero_window_follows_input() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::ZERO, false, start);

        assert_eq!(debounce.update(true, start), Some(Edge::Rising));
        assert_eq!(debounce.update(false, start), Some(Edge::Falling));
        assert_eq!(debounce.update(false, start), None);
    }
}

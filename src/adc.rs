use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::PinConfig;
use crate::error::AdcError;
use crate::signal::RawSample;

pub const ADC_CHANNELS: u8 = 8;

// Start bit + single-ended bit + 3 channel bits
const COMMAND_BITS: u32 = 5;
// Null bit + 10 data bits + one trailing clock
const READ_CLOCKS: u32 = 12;
const SAMPLE_BITS: u32 = 10;

// Below this a thread sleep overshoots too much, spin instead
const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

/// One of the eight single-ended MCP3008 inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel(u8);

impl Channel {
    pub const TUNER: Channel = Channel(0);
    pub const VOLUME: Channel = Channel(1);

    pub fn new(index: u8) -> Result<Self, AdcError> {
        if index >= ADC_CHANNELS {
            return Err(AdcError::InvalidChannel(index));
        }
        Ok(Channel(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    fn command_word(self) -> u8 {
        0b1_1000 | self.0
    }
}

/// Clock settling and line polarities for the software SPI exchange.
///
/// Chip-select level and clock polarity are calibrated against the wired
/// board rather than fixed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitBangTiming {
    /// Delay after every clock edge.
    pub half_period: Duration,
    pub chip_select_active: Level,
    pub clock_idle: Level,
}

impl Default for BitBangTiming {
    fn default() -> Self {
        BitBangTiming {
            half_period: Duration::from_millis(1),
            chip_select_active: Level::Low,
            clock_idle: Level::Low,
        }
    }
}

/// The four lines of a software SPI bus.
pub trait SpiLines {
    fn set_clock(&mut self, level: Level);
    fn set_mosi(&mut self, level: Level);
    fn read_miso(&mut self) -> Level;
    fn set_chip_select(&mut self, level: Level);
}

/// SPI lines driven directly through rppal GPIO pins.
pub struct GpioLines {
    clock: OutputPin,
    mosi: OutputPin,
    miso: InputPin,
    chip_select: OutputPin,
}

impl GpioLines {
    pub fn new(gpio: &Gpio, pins: &PinConfig) -> Result<Self, rppal::gpio::Error> {
        let clock = gpio.get(pins.clock)?.into_output_low();
        let mosi = gpio.get(pins.mosi)?.into_output_low();
        let miso = gpio.get(pins.miso)?.into_input();
        let chip_select = gpio.get(pins.chip_select)?.into_output_high();
        tracing::info!(
            "Software SPI on GPIO clk={} mosi={} miso={} cs={}",
            pins.clock, pins.mosi, pins.miso, pins.chip_select
        );
        Ok(GpioLines { clock, mosi, miso, chip_select })
    }
}

impl SpiLines for GpioLines {
    fn set_clock(&mut self, level: Level) {
        self.clock.write(level);
    }

    fn set_mosi(&mut self, level: Level) {
        self.mosi.write(level);
    }

    fn read_miso(&mut self) -> Level {
        self.miso.read()
    }

    fn set_chip_select(&mut self, level: Level) {
        self.chip_select.write(level);
    }
}

/// MCP3008 10-bit ADC read by bit-banging its serial protocol.
pub struct Mcp3008<L: SpiLines> {
    lines: L,
    timing: BitBangTiming,
}

impl<L: SpiLines> Mcp3008<L> {
    /// Take ownership of the lines and park them idle (chip deselected,
    /// clock at its idle level).
    pub fn new(mut lines: L, timing: BitBangTiming) -> Self {
        lines.set_chip_select(opposite(timing.chip_select_active));
        lines.set_clock(timing.clock_idle);
        lines.set_mosi(Level::Low);
        Mcp3008 { lines, timing }
    }

    /// Run one single-ended conversion on `channel`.
    pub fn read(&mut self, channel: Channel) -> RawSample {
        self.lines.set_chip_select(self.timing.chip_select_active);
        self.settle();

        let command = channel.command_word();
        for bit in (0..COMMAND_BITS).rev() {
            let level = if (command >> bit) & 1 == 1 { Level::High } else { Level::Low };
            self.lines.set_mosi(level);
            self.pulse_clock();
        }

        let mut value: u16 = 0;
        for clock in 0..READ_CLOCKS {
            self.pulse_clock();
            // clock 0 carries the null bit, the last one is not sampled
            if (1..=SAMPLE_BITS).contains(&clock) {
                value <<= 1;
                if self.lines.read_miso() == Level::High {
                    value |= 1;
                }
            }
        }

        self.lines.set_chip_select(opposite(self.timing.chip_select_active));
        self.lines.set_mosi(Level::Low);

        RawSample::new(value)
    }

    fn pulse_clock(&mut self) {
        self.lines.set_clock(opposite(self.timing.clock_idle));
        self.settle();
        self.lines.set_clock(self.timing.clock_idle);
        self.settle();
    }

    fn settle(&self) {
        let delay = self.timing.half_period;
        if delay.is_zero() {
            return;
        }
        if delay >= SPIN_THRESHOLD {
            thread::sleep(delay);
            return;
        }
        let start = Instant::now();
        while start.elapsed() < delay {
            std::hint::spin_loop();
        }
    }
}

fn opposite(level: Level) -> Level {
    match level {
        Level::Low => Level::High,
        Level::High => Level::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Behavioural model of the MCP3008 serial interface.
    struct SimulatedAdc {
        values: [u16; 8],
        timing: BitBangTiming,
        selected: bool,
        clock: Level,
        mosi: Level,
        miso: Level,
        command: Vec<u8>,
        read_clock: bool,
        read_edges: usize,
        clocks_while_selected: u32,
        transactions: u32,
        commands_seen: Vec<Vec<u8>>,
    }

    impl SimulatedAdc {
        fn new(values: [u16; 8], timing: BitBangTiming) -> Self {
            SimulatedAdc {
                values,
                timing,
                selected: false,
                clock: timing.clock_idle,
                mosi: Level::Low,
                miso: Level::Low,
                command: Vec::new(),
                read_clock: false,
                read_edges: 0,
                clocks_while_selected: 0,
                transactions: 0,
                commands_seen: Vec::new(),
            }
        }

        fn output_bit(&self, index: usize) -> Level {
            let channel = self.command[2..]
                .iter()
                .fold(0usize, |acc, bit| (acc << 1) | *bit as usize);
            let value = self.values[channel];
            // null bit, B9..B0, then zeros
            let bit = match index {
                1..=10 => (value >> (10 - index)) & 1,
                _ => 0,
            };
            if bit == 1 { Level::High } else { Level::Low }
        }
    }

    impl SpiLines for SimulatedAdc {
        fn set_clock(&mut self, level: Level) {
            if level == self.clock {
                return;
            }
            self.clock = level;
            if !self.selected {
                return;
            }
            if level != self.timing.clock_idle {
                self.clocks_while_selected += 1;
                if self.command.len() < COMMAND_BITS as usize {
                    self.command.push(u8::from(self.mosi == Level::High));
                    self.read_clock = false;
                } else {
                    self.read_clock = true;
                }
            } else if self.read_clock {
                self.miso = self.output_bit(self.read_edges);
                self.read_edges += 1;
            }
        }

        fn set_mosi(&mut self, level: Level) {
            self.mosi = level;
        }

        fn read_miso(&mut self) -> Level {
            if self.selected { self.miso } else { Level::High }
        }

        fn set_chip_select(&mut self, level: Level) {
            let selected = level == self.timing.chip_select_active;
            if selected && !self.selected {
                self.transactions += 1;
                self.command.clear();
                self.read_clock = false;
                self.read_edges = 0;
                self.clocks_while_selected = 0;
            }
            if !selected && self.selected {
                self.commands_seen.push(self.command.clone());
            }
            self.selected = selected;
        }
    }

    fn fast(chip_select_active: Level, clock_idle: Level) -> BitBangTiming {
        BitBangTiming {
            half_period: Duration::ZERO,
            chip_select_active,
            clock_idle,
        }
    }

    const VALUES: [u16; 8] = [0x3FF, 0x201, 0, 512, 1, 0x2AA, 0x155, 700];

    #[test]
    fn channel_range_is_checked() {
        assert_eq!(Channel::new(7).unwrap().index(), 7);
        assert!(matches!(Channel::new(8), Err(AdcError::InvalidChannel(8))));
        assert_eq!(Channel::TUNER.index(), 0);
        assert_eq!(Channel::VOLUME.index(), 1);
    }

    #[test]
    fn reads_every_channel() {
        let timing = fast(Level::Low, Level::Low);
        let mut adc = Mcp3008::new(SimulatedAdc::new(VALUES, timing), timing);
        for index in 0..ADC_CHANNELS {
            let sample = adc.read(Channel::new(index).unwrap());
            assert_eq!(sample.value(), VALUES[index as usize], "channel {}", index);
        }
        assert_eq!(adc.lines.transactions, 8);
    }

    #[test]
    fn sends_start_single_ended_and_channel_bits() {
        let timing = fast(Level::Low, Level::Low);
        let mut adc = Mcp3008::new(SimulatedAdc::new(VALUES, timing), timing);
        adc.read(Channel::new(5).unwrap());
        adc.read(Channel::TUNER);
        assert_eq!(adc.lines.commands_seen, vec![vec![1, 1, 1, 0, 1], vec![1, 1, 0, 0, 0]]);
    }

    #[test]
    fn frames_seventeen_clocks_per_conversion() {
        let timing = fast(Level::Low, Level::Low);
        let mut adc = Mcp3008::new(SimulatedAdc::new(VALUES, timing), timing);
        adc.read(Channel::VOLUME);
        assert_eq!(adc.lines.clocks_while_selected, COMMAND_BITS + READ_CLOCKS);
        assert!(!adc.lines.selected);
        assert_eq!(adc.lines.clock, Level::Low);
    }

    #[test]
    fn supports_inverted_polarities() {
        let timing = fast(Level::High, Level::High);
        let mut adc = Mcp3008::new(SimulatedAdc::new(VALUES, timing), timing);
        assert!(!adc.lines.selected);
        assert_eq!(adc.read(Channel::new(1).unwrap()).value(), 0x201);
        assert_eq!(adc.read(Channel::new(6).unwrap()).value(), 0x155);
        assert_eq!(adc.lines.clock, Level::High);
    }

    #[test]
    fn settle_waits_for_short_delays() {
        let timing = BitBangTiming {
            half_period: Duration::from_micros(20),
            ..BitBangTiming::default()
        };
        let mut adc = Mcp3008::new(SimulatedAdc::new(VALUES, timing), timing);
        let start = Instant::now();
        assert_eq!(adc.read(Channel::TUNER).value(), 0x3FF);
        // 17 clocks, two edges each, plus the chip-select settle
        assert!(start.elapsed() >= Duration::from_micros(20 * 35));
    }
}

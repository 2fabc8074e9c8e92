//! GhostRadio: a vintage radio cabinet driven by a Raspberry Pi.
//!
//! The power switch and the two dials on the front panel are read over GPIO
//! and a bit-banged MCP3008; the tuner position picks an internet stream from
//! the station list, or static when it points between stations.

pub mod adc;
pub mod config;
pub mod controller;
pub mod error;
pub mod panel;
pub mod player;
pub mod shutdown;
pub mod signal;
pub mod state;
pub mod stations;
pub mod switch;
pub mod websocket;

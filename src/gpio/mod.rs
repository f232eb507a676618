//! GPIO access for the relay board
//!
//! The rest of the crate talks to pins through the [`Board`], [`OutputLine`] and
//! [`InputLine`] traits. [`rppal_board::RppalBoard`] drives the real Raspberry Pi
//! header; tests use the in-memory board from `mock`.
//!
//! A board hands out owned pin lines. Whoever holds a line owns the pin, and
//! dropping the line releases it again.

pub mod rppal_board;

#[cfg(test)]
pub mod mock;

use crate::channel::{Channel, CHANNEL_COUNT};

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Payload used on status topics
    pub fn as_payload(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

impl From<rppal::gpio::Level> for Level {
    fn from(level: rppal::gpio::Level) -> Self {
        match level {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        }
    }
}

impl From<Level> for rppal::gpio::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => rppal::gpio::Level::Low,
            Level::High => rppal::gpio::Level::High,
        }
    }
}

/// Bias resistor applied to an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Up,
    Down,
}

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO driver error: {0}")]
    Driver(#[from] rppal::gpio::Error),

    #[error("Pin {0} is not available")]
    PinUnavailable(u8),
}

/// A pin configured as output
pub trait OutputLine: Send {
    fn drive(&mut self, level: Level);
}

/// A pin configured as input
pub trait InputLine: Send {
    fn sample(&self) -> Level;
}

/// Process-wide handle on the GPIO driver.
///
/// Acquired once at startup. It must outlive every line handed out from it.
pub trait Board: Send + Sync {
    fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, GpioError>;

    fn input(&self, pin: u8, pull: Pull) -> Result<Box<dyn InputLine>, GpioError>;
}

/// Fixed wiring of the eight relay outputs and eight sensor inputs (BCM numbering)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardLayout {
    pub relay_pins: [u8; CHANNEL_COUNT],
    pub input_pins: [u8; CHANNEL_COUNT],
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            relay_pins: [5, 6, 13, 16, 19, 20, 21, 26],
            input_pins: [4, 17, 18, 22, 23, 24, 25, 27],
        }
    }
}

impl BoardLayout {
    pub fn relay_pin(&self, channel: Channel) -> u8 {
        self.relay_pins[channel.index()]
    }

    pub fn input_pin(&self, channel: Channel) -> u8 {
        self.input_pins[channel.index()]
    }
}

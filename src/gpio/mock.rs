//! In-memory board for tests. Records every write and lets tests set input levels.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{Board, GpioError, InputLine, Level, OutputLine, Pull};

#[derive(Debug, Default)]
struct Pins {
    claimed: HashSet<u8>,
    released: Vec<u8>,
    inputs: HashMap<u8, Level>,
    writes: Vec<(u8, Level)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBoard {
    pins: Arc<Mutex<Pins>>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&self, pin: u8, level: Level) {
        self.pins.lock().unwrap().inputs.insert(pin, level);
    }

    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.pins.lock().unwrap().writes.clone()
    }

    pub fn released(&self) -> Vec<u8> {
        self.pins.lock().unwrap().released.clone()
    }

    fn claim(&self, pin: u8) -> Result<(), GpioError> {
        let mut pins = self.pins.lock().unwrap();
        if !pins.claimed.insert(pin) {
            return Err(GpioError::PinUnavailable(pin));
        }
        Ok(())
    }
}

impl Board for MockBoard {
    fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, GpioError> {
        self.claim(pin)?;
        Ok(Box::new(MockLine {
            pin,
            pins: self.pins.clone(),
        }))
    }

    fn input(&self, pin: u8, pull: Pull) -> Result<Box<dyn InputLine>, GpioError> {
        self.claim(pin)?;
        let idle = match pull {
            Pull::Down => Level::Low,
            Pull::Up | Pull::Off => Level::High,
        };
        self.pins.lock().unwrap().inputs.entry(pin).or_insert(idle);
        Ok(Box::new(MockLine {
            pin,
            pins: self.pins.clone(),
        }))
    }
}

struct MockLine {
    pin: u8,
    pins: Arc<Mutex<Pins>>,
}

impl OutputLine for MockLine {
    fn drive(&mut self, level: Level) {
        self.pins.lock().unwrap().writes.push((self.pin, level));
    }
}

impl InputLine for MockLine {
    fn sample(&self) -> Level {
        let pins = self.pins.lock().unwrap();
        pins.inputs.get(&self.pin).copied().unwrap_or(Level::Low)
    }
}

impl Drop for MockLine {
    fn drop(&mut self) {
        if let Ok(mut pins) = self.pins.lock() {
            pins.claimed.remove(&self.pin);
            pins.released.push(self.pin);
        }
    }
}

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{debug, info};

use super::{Board, GpioError, InputLine, Level, OutputLine, Pull};

/// Board backed by the Raspberry Pi GPIO header via rppal
#[derive(Debug)]
pub struct RppalBoard {
    gpio: Gpio,
}

impl RppalBoard {
    pub fn open() -> Result<Self, GpioError> {
        let gpio = Gpio::new()?;
        info!("Opened GPIO driver");
        Ok(Self { gpio })
    }
}

impl Board for RppalBoard {
    fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, GpioError> {
        let output = self.gpio.get(pin)?.into_output();
        debug!("Configured BCM {} as output", pin);
        Ok(Box::new(output))
    }

    fn input(&self, pin: u8, pull: Pull) -> Result<Box<dyn InputLine>, GpioError> {
        let pin_handle = self.gpio.get(pin)?;
        let input = match pull {
            Pull::Off => pin_handle.into_input(),
            Pull::Up => pin_handle.into_input_pullup(),
            Pull::Down => pin_handle.into_input_pulldown(),
        };
        debug!("Configured BCM {} as input ({:?})", pin, pull);
        Ok(Box::new(input))
    }
}

impl OutputLine for OutputPin {
    fn drive(&mut self, level: Level) {
        OutputPin::write(self, level.into());
    }
}

impl InputLine for InputPin {
    fn sample(&self) -> Level {
        InputPin::read(self).into()
    }
}

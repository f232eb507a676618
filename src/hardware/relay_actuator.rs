use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::gpio::{Board, BoardLayout, GpioError, Level, OutputLine};

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Failed to set up relay output: {0}")]
    Gpio(#[from] GpioError),

    #[error("Not pulsing invalid relay {0}")]
    UnknownChannel(u8),
}

struct Relay {
    pin: u8,
    line: Box<dyn OutputLine>,
}

/// Drives the relay outputs. A pulse pulls the pin low, waits, releases it high, waits again.
pub struct RelayActuator {
    relays: BTreeMap<Channel, Relay>,
    dwell: Duration,
}

impl RelayActuator {
    pub fn new(board: &dyn Board, layout: &BoardLayout, dwell: Duration) -> Result<Self, ActuatorError> {
        let mut relays = BTreeMap::new();
        for channel in Channel::all() {
            let pin = layout.relay_pin(channel);
            let line = board.output(pin)?;
            relays.insert(channel, Relay { pin, line });
        }
        info!("Successfully set up {} relays for output", relays.len());
        Ok(Self { relays, dwell })
    }

    pub async fn pulse(&mut self, channel: Channel) -> Result<(), ActuatorError> {
        let relay = self
            .relays
            .get_mut(&channel)
            .ok_or(ActuatorError::UnknownChannel(channel.number()))?;

        debug!("Pulsing {} on BCM {}", channel, relay.pin);
        relay.line.drive(Level::Low);
        tokio::time::sleep(self.dwell).await;
        relay.line.drive(Level::High);
        tokio::time::sleep(self.dwell).await;
        Ok(())
    }

    /// Pulses by raw channel number, as typed on the keyboard
    pub async fn pulse_number(&mut self, number: u8) -> Result<(), ActuatorError> {
        let channel = Channel::new(number).ok_or(ActuatorError::UnknownChannel(number))?;
        self.pulse(channel).await
    }

    /// Pulses every relay in ascending channel order, one after the other
    pub async fn pulse_all(&mut self) {
        info!("Pulsing all relays");
        for channel in Channel::all() {
            if let Err(e) = self.pulse(channel).await {
                warn!("{}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::mock::MockBoard;

    fn actuator(board: &MockBoard) -> RelayActuator {
        RelayActuator::new(board, &BoardLayout::default(), Duration::from_millis(50)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_writes_low_then_high() {
        let board = MockBoard::new();
        let mut relays = actuator(&board);

        let started = tokio::time::Instant::now();
        relays.pulse(Channel::new(3).unwrap()).await.unwrap();

        assert_eq!(board.writes(), vec![(13, Level::Low), (13, Level::High)]);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_channel_touches_no_pin() {
        let board = MockBoard::new();
        let mut relays = actuator(&board);

        assert!(matches!(
            relays.pulse_number(0).await,
            Err(ActuatorError::UnknownChannel(0))
        ));
        assert!(matches!(
            relays.pulse_number(9).await,
            Err(ActuatorError::UnknownChannel(9))
        ));
        assert!(board.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_all_is_ascending_and_sequential() {
        let board = MockBoard::new();
        let mut relays = actuator(&board);

        relays.pulse_all().await;

        let expected: Vec<(u8, Level)> = BoardLayout::default()
            .relay_pins
            .iter()
            .flat_map(|pin| [(*pin, Level::Low), (*pin, Level::High)])
            .collect();
        assert_eq!(board.writes(), expected);
    }

    #[test]
    fn relay_pins_are_claimed_once() {
        let board = MockBoard::new();
        let _relays = actuator(&board);

        assert!(matches!(
            RelayActuator::new(&board, &BoardLayout::default(), Duration::ZERO),
            Err(ActuatorError::Gpio(GpioError::PinUnavailable(5)))
        ));
    }
}

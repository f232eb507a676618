//! Hardware Handle - lifecycle of the relay outputs and input pollers
//!
//! Claims every pin of the board layout, starts one poller thread per input
//! channel and hands back the two halves the dispatch task works with:
//!
//! ```text
//! PinPoller x8 ─[InputChange]→ InputDispatcher → dispatch task → RelayActuator
//!               (unbounded mpsc, FIFO per poller)
//! ```
//!
//! The handle keeps the stop token and the completion signals of the pollers.
//! [`HardwareHandle::shutdown`] stops them and waits a bounded time for each.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::input_dispatcher::InputDispatcher;
use super::pin_poller::{PinPoller, PollerError, PollerHandle, PollerSettings};
use super::relay_actuator::{ActuatorError, RelayActuator};
use crate::channel::Channel;
use crate::gpio::{Board, BoardLayout, GpioError, Pull};

/// Timing and bias settings for the whole board
#[derive(Clone, Debug)]
pub struct HardwareSettings {
    /// Delay between two samples of one input pin
    pub poll_interval: Duration,

    /// Time the relay is held low, and the pause after releasing it
    pub pulse_dwell: Duration,

    /// How long shutdown waits for each poller thread
    pub stop_timeout: Duration,

    pub input_pull: Pull,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(250),
            pulse_dwell: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(1),
            input_pull: Pull::Up,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Poller error: {0}")]
    Poller(#[from] PollerError),
}

pub struct HardwareHandle {
    stop: CancellationToken,
    pollers: Vec<PollerHandle>,
    stop_timeout: Duration,
}

impl HardwareHandle {
    pub fn spawn(
        board: &dyn Board,
        layout: &BoardLayout,
        settings: Option<HardwareSettings>,
    ) -> Result<(Self, RelayActuator, InputDispatcher), HardwareError> {
        let settings = settings.unwrap_or_default();
        info!("Initializing hardware with settings: {:?}", settings);

        let actuator = RelayActuator::new(board, layout, settings.pulse_dwell)?;

        // Claim every input before starting any thread
        let mut lines = Vec::new();
        for channel in Channel::all() {
            let pin = layout.input_pin(channel);
            lines.push((channel, pin, board.input(pin, settings.input_pull)?));
        }

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let poller_settings = PollerSettings {
            poll_interval: settings.poll_interval,
        };

        let mut pollers = Vec::new();
        for (channel, pin, line) in lines {
            let poller = PinPoller::create(
                channel,
                pin,
                line,
                event_sender.clone(),
                Some(poller_settings.clone()),
            );
            match PollerHandle::spawn(poller, stop.clone()) {
                Ok(handle) => pollers.push(handle),
                Err(e) => {
                    stop.cancel();
                    return Err(e.into());
                }
            }
        }
        debug!("Spawned {} pollers", pollers.len());

        info!("Hardware initialized successfully");
        Ok((
            Self {
                stop,
                pollers,
                stop_timeout: settings.stop_timeout,
            },
            actuator,
            InputDispatcher::new(event_receiver),
        ))
    }

    /// Stops every poller and waits for each up to the stop timeout.
    /// Returns once all pollers finished or timed out.
    pub async fn shutdown(self) {
        info!("Stopping {} pollers", self.pollers.len());
        self.stop.cancel();

        let mut stuck = 0;
        for poller in self.pollers {
            if !poller.wait(self.stop_timeout).await {
                stuck += 1;
            }
        }
        if stuck > 0 {
            warn!("{} pollers did not stop, proceeding anyway", stuck);
        } else {
            info!("All pollers stopped");
        }
    }
}

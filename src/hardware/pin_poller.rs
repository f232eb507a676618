use std::time::Duration;

use chrono::{DateTime, Local};
use statum::{machine, state};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::gpio::{InputLine, Level};

/// A sensor input changed level
#[derive(Debug, Clone, PartialEq)]
pub struct InputChange {
    pub channel: Channel,
    pub level: Level,
    pub timestamp: DateTime<Local>,
}

// Poller settings
#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub poll_interval: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(250),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Event receiver for {0} is gone")]
    ReceiverClosed(Channel),

    #[error("Failed to spawn poller thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[state]
#[derive(Debug, Clone)]
pub enum PollerState {
    Configured,
    Polling,
}

#[machine]
pub struct PinPoller<S: PollerState> {
    channel: Channel,
    pin: u8,
    line: Box<dyn InputLine>,

    // None until the first sample, so that one is always reported
    last_reported: Option<Level>,

    event_sender: mpsc::UnboundedSender<InputChange>,
    settings: PollerSettings,
}

impl<S: PollerState> PinPoller<S> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Most recent level this poller reported, if any
    #[cfg(test)]
    pub fn last_reported(&self) -> Option<Level> {
        self.last_reported
    }
}

impl PinPoller<Configured> {
    pub fn create(
        channel: Channel,
        pin: u8,
        line: Box<dyn InputLine>,
        event_sender: mpsc::UnboundedSender<InputChange>,
        settings: Option<PollerSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        debug!(
            "Creating poller for {} on BCM {} with settings: {:?}",
            channel, pin, settings
        );
        Self::new(channel, pin, line, None, event_sender, settings)
    }

    pub fn start(self) -> PinPoller<Polling> {
        info!("Polling {} on BCM {}", self.channel, self.pin);
        self.transition()
    }
}

impl PinPoller<Polling> {
    /// Reads the pin once and returns a change if the level differs from the last report
    pub fn sample(&mut self) -> Option<InputChange> {
        let level = self.line.sample();
        if self.last_reported == Some(level) {
            return None;
        }
        self.last_reported = Some(level);
        Some(InputChange {
            channel: self.channel,
            level,
            timestamp: Local::now(),
        })
    }

    pub fn poll_once(&mut self) -> Result<(), PollerError> {
        if let Some(change) = self.sample() {
            debug!(
                "{} changed to {:?} at {}",
                change.channel,
                change.level,
                change.timestamp.format("%H:%M:%S%.3f")
            );
            self.event_sender
                .send(change)
                .map_err(|_| PollerError::ReceiverClosed(self.channel))?;
        }
        Ok(())
    }

    /// Polls until `stop` is cancelled. Stop is checked once per interval.
    pub fn run(&mut self, stop: &CancellationToken) -> Result<(), PollerError> {
        while !stop.is_cancelled() {
            self.poll_once()?;
            std::thread::sleep(self.settings.poll_interval);
        }
        debug!("Poller for {} observed stop", self.channel);
        Ok(())
    }
}

/// Owns a running poller thread
#[derive(Debug)]
pub struct PollerHandle {
    channel: Channel,
    done: oneshot::Receiver<()>,
}

impl PollerHandle {
    pub fn spawn(poller: PinPoller<Configured>, stop: CancellationToken) -> Result<Self, PollerError> {
        let channel = poller.channel();
        let (done_sender, done) = oneshot::channel();

        std::thread::Builder::new()
            .name(format!("poller-{}", channel.number()))
            .spawn(move || {
                let mut poller = poller.start();
                if let Err(e) = poller.run(&stop) {
                    error!("Poller for {} terminated with error: {}", channel, e);
                }
                // Release the pin before reporting completion
                drop(poller);
                // Receiver may already have given up waiting
                let _ = done_sender.send(());
            })?;

        Ok(Self { channel, done })
    }

    /// Handle with no thread behind it. Completion is signalled through the
    /// returned sender.
    #[cfg(test)]
    pub(crate) fn detached(channel: Channel) -> (Self, oneshot::Sender<()>) {
        let (done_sender, done) = oneshot::channel();
        (Self { channel, done }, done_sender)
    }

    /// Waits up to `timeout` for the poller thread to finish. Returns whether it did.
    pub async fn wait(self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.done).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    "Poller for {} did not stop within {:?}",
                    self.channel, timeout
                );
                false
            }
        }
    }
}

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use super::pin_poller::InputChange;
use crate::channel::Channel;
use crate::gpio::Level;

/// Single consumer for the events of all pin pollers.
///
/// Events from one poller arrive in the order they were sampled. The latest
/// level per channel is retained so it can be republished on demand.
#[derive(Debug)]
pub struct InputDispatcher {
    event_receiver: mpsc::UnboundedReceiver<InputChange>,
    last_known: BTreeMap<Channel, Level>,
}

impl InputDispatcher {
    pub fn new(event_receiver: mpsc::UnboundedReceiver<InputChange>) -> Self {
        Self {
            event_receiver,
            last_known: BTreeMap::new(),
        }
    }

    /// Next change from any poller. `None` once every poller is gone.
    pub async fn next(&mut self) -> Option<InputChange> {
        let change = self.event_receiver.recv().await?;
        debug!("Dispatching {} = {:?}", change.channel, change.level);
        self.last_known.insert(change.channel, change.level);
        Some(change)
    }

    /// Absorbs every change already queued without waiting for more. Returns
    /// how many were taken.
    pub fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(change) = self.event_receiver.try_recv() {
            self.last_known.insert(change.channel, change.level);
            drained += 1;
        }
        if drained > 0 {
            debug!("Absorbed {} queued input changes", drained);
        }
        drained
    }

    #[cfg(test)]
    pub fn last_known(&self, channel: Channel) -> Option<Level> {
        self.last_known.get(&channel).copied()
    }

    /// Latest level of every channel seen so far, ascending by channel
    pub fn snapshot(&self) -> Vec<(Channel, Level)> {
        self.last_known
            .iter()
            .map(|(channel, level)| (*channel, *level))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn change(channel: u8, level: Level) -> InputChange {
        InputChange {
            channel: Channel::new(channel).unwrap(),
            level,
            timestamp: Local::now(),
        }
    }

    #[tokio::test]
    async fn events_are_delivered_in_order_and_retained() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut dispatcher = InputDispatcher::new(receiver);

        sender.send(change(2, Level::High)).unwrap();
        sender.send(change(2, Level::Low)).unwrap();
        sender.send(change(5, Level::High)).unwrap();

        assert_eq!(dispatcher.next().await.unwrap().level, Level::High);
        assert_eq!(dispatcher.next().await.unwrap().level, Level::Low);
        assert_eq!(dispatcher.last_known(Channel::new(2).unwrap()), Some(Level::Low));
        assert_eq!(dispatcher.last_known(Channel::new(5).unwrap()), None);

        dispatcher.next().await.unwrap();
        assert_eq!(
            dispatcher.snapshot(),
            vec![
                (Channel::new(2).unwrap(), Level::Low),
                (Channel::new(5).unwrap(), Level::High),
            ]
        );
    }

    #[tokio::test]
    async fn drain_pending_absorbs_queued_changes() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut dispatcher = InputDispatcher::new(receiver);

        sender.send(change(1, Level::High)).unwrap();
        assert_eq!(dispatcher.next().await.unwrap().level, Level::High);

        sender.send(change(1, Level::Low)).unwrap();
        sender.send(change(4, Level::High)).unwrap();
        assert_eq!(dispatcher.drain_pending(), 2);
        assert_eq!(
            dispatcher.snapshot(),
            vec![
                (Channel::new(1).unwrap(), Level::Low),
                (Channel::new(4).unwrap(), Level::High),
            ]
        );
        assert_eq!(dispatcher.drain_pending(), 0);
    }

    #[tokio::test]
    async fn ends_when_all_senders_are_dropped() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut dispatcher = InputDispatcher::new(receiver);
        drop(sender);

        assert!(dispatcher.next().await.is_none());
        assert!(dispatcher.snapshot().is_empty());
    }
}

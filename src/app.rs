//! The dispatch task
//!
//! Everything that touches the relays or the transport runs here, one event at
//! a time: input changes, transport events, key presses and signals. A pulse
//! holds up the whole loop until it has finished.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hardware::{InputChange, InputDispatcher, RelayActuator};
use crate::keyboard::KeyCommand;
use crate::mqtt::transport::Transport;
use crate::mqtt::{Bridge, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    Interrupted,
    Terminated,
    InputsClosed,
}

/// Process signals the dispatch task reacts to
pub struct Signals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl Signals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }
}

enum Step {
    Input(Option<InputChange>),
    Transport(Option<TransportEvent>),
    Key(Option<KeyCommand>),
    Restart,
    Exit(ExitReason),
}

pub struct Controller<T: Transport> {
    actuator: RelayActuator,
    dispatcher: InputDispatcher,
    bridge: Option<Bridge<T>>,
    transport_events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    keys: Option<mpsc::UnboundedReceiver<KeyCommand>>,
}

impl<T: Transport> Controller<T> {
    pub fn new(actuator: RelayActuator, dispatcher: InputDispatcher) -> Self {
        Self {
            actuator,
            dispatcher,
            bridge: None,
            transport_events: None,
            keys: None,
        }
    }

    pub fn with_bridge(
        mut self,
        bridge: Bridge<T>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        self.bridge = Some(bridge);
        self.transport_events = Some(transport_events);
        self
    }

    pub fn with_keyboard(mut self, keys: mpsc::UnboundedReceiver<KeyCommand>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Runs until quit, a terminating signal, or the loss of all pollers.
    /// The bridge is stopped before returning.
    pub async fn run(mut self, mut signals: Signals) -> ExitReason {
        if let Some(bridge) = &mut self.bridge {
            bridge.start();
        } else {
            info!("Running without MQTT bridge");
        }

        let reason = loop {
            let step = tokio::select! {
                biased;
                _ = signals.interrupt.recv() => Step::Exit(ExitReason::Interrupted),
                _ = signals.terminate.recv() => Step::Exit(ExitReason::Terminated),
                _ = signals.hangup.recv() => Step::Restart,
                event = recv_if_open(&mut self.transport_events) => Step::Transport(event),
                change = self.dispatcher.next() => Step::Input(change),
                key = recv_if_open(&mut self.keys) => Step::Key(key),
            };

            if let Some(reason) = self.handle(step).await {
                break reason;
            }
        };

        info!("Shutting down ({:?})", reason);
        if let Some(bridge) = &mut self.bridge {
            bridge.stop().await;
        }
        reason
    }

    async fn handle(&mut self, step: Step) -> Option<ExitReason> {
        match step {
            Step::Exit(reason) => return Some(reason),
            Step::Restart => match &mut self.bridge {
                Some(bridge) => {
                    debug!("Bridge was {:?} before restart", bridge.state());
                    bridge.restart().await;
                }
                None => info!("No MQTT bridge configured, nothing to restart"),
            },
            Step::Input(None) => {
                warn!("All pollers are gone");
                return Some(ExitReason::InputsClosed);
            }
            Step::Input(Some(change)) => {
                if let Some(bridge) = &mut self.bridge {
                    bridge.publish_status(change.channel, change.level).await;
                }
            }
            Step::Transport(None) => {
                debug!("Transport event channel closed");
                self.transport_events = None;
            }
            Step::Transport(Some(event)) => {
                if let Some(bridge) = &mut self.bridge {
                    bridge
                        .handle_transport_event(event, &mut self.dispatcher, &mut self.actuator)
                        .await;
                }
            }
            Step::Key(None) => {
                debug!("Keyboard closed");
                self.keys = None;
            }
            Step::Key(Some(KeyCommand::Quit)) => return Some(ExitReason::Quit),
            Step::Key(Some(KeyCommand::PulseAll)) => self.actuator.pulse_all().await,
            Step::Key(Some(KeyCommand::Pulse(number))) => {
                if let Err(e) = self.actuator.pulse_number(number).await {
                    warn!("{}", e);
                }
            }
        }
        None
    }
}

async fn recv_if_open<M>(receiver: &mut Option<mpsc::UnboundedReceiver<M>>) -> Option<M> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;
    use rumqttc::QoS;

    use super::*;
    use crate::channel::Channel;
    use crate::config::{Config, TopicBinding};
    use crate::gpio::mock::MockBoard;
    use crate::gpio::{BoardLayout, Level};
    use crate::mqtt::config::MqttConfig;
    use crate::mqtt::transport::mock::MockTransport;
    use crate::mqtt::ConnectionState;

    fn actuator(board: &MockBoard) -> RelayActuator {
        RelayActuator::new(board, &BoardLayout::default(), Duration::from_millis(50)).unwrap()
    }

    fn config() -> Config {
        Config {
            mqtt: MqttConfig {
                host: "broker.local".to_string(),
                ..MqttConfig::default()
            },
            topics: TopicBinding {
                toggle_topics: vec!["a/toggle".to_string(), "b/toggle".to_string()],
                status_topics: vec!["a/status".to_string(), "b/status".to_string()],
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keys_pulse_relays_until_quit() {
        let board = MockBoard::new();
        let (_inputs, input_receiver) = mpsc::unbounded_channel();
        let (keys, key_receiver) = mpsc::unbounded_channel();
        keys.send(KeyCommand::Pulse(2)).unwrap();
        keys.send(KeyCommand::Pulse(9)).unwrap();
        keys.send(KeyCommand::Quit).unwrap();
        keys.send(KeyCommand::PulseAll).unwrap();

        let controller: Controller<MockTransport> =
            Controller::new(actuator(&board), InputDispatcher::new(input_receiver))
                .with_keyboard(key_receiver);
        let reason = controller.run(Signals::install().unwrap()).await;

        assert_eq!(reason, ExitReason::Quit);
        assert_eq!(board.writes(), vec![(6, Level::Low), (6, Level::High)]);
    }

    #[tokio::test(start_paused = true)]
    async fn input_changes_reach_the_broker_once_connected() {
        let board = MockBoard::new();
        let transport = MockTransport::new();
        let (inputs, input_receiver) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let (keys, key_receiver) = mpsc::unbounded_channel();

        events
            .send(TransportEvent::StateChanged {
                session: 1,
                state: ConnectionState::Connected,
            })
            .unwrap();
        inputs
            .send(InputChange {
                channel: Channel::new(2).unwrap(),
                level: Level::Low,
                timestamp: Local::now(),
            })
            .unwrap();
        keys.send(KeyCommand::Quit).unwrap();

        let controller = Controller::new(actuator(&board), InputDispatcher::new(input_receiver))
            .with_bridge(Bridge::new(transport.clone(), &config()), event_receiver)
            .with_keyboard(key_receiver);
        let reason = controller.run(Signals::install().unwrap()).await;

        assert_eq!(reason, ExitReason::Quit);
        assert_eq!(transport.subscriptions().len(), 2);
        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "b/status");
        assert_eq!(published[0].payload, b"0");
        assert_eq!(published[0].qos, QoS::AtLeastOnce);
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn losing_all_pollers_ends_the_loop() {
        let board = MockBoard::new();
        let (inputs, input_receiver) = mpsc::unbounded_channel::<InputChange>();
        drop(inputs);

        let controller: Controller<MockTransport> =
            Controller::new(actuator(&board), InputDispatcher::new(input_receiver));
        let reason = controller.run(Signals::install().unwrap()).await;

        assert_eq!(reason, ExitReason::InputsClosed);
    }
}

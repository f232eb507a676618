use rumqttc::QoS;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::transport::{ConnectionState, SessionId, Transport, TransportEvent};
use crate::channel::{Channel, ChannelMap};
use crate::config::Config;
use crate::gpio::Level;
use crate::hardware::{InputDispatcher, RelayActuator};

/// Links the broker to the board: toggle messages pulse relays, input changes
/// are published as retained status messages.
///
/// Runs entirely inside the dispatch task. Every transport event is handled to
/// completion before the next one, pulses included.
pub struct Bridge<T: Transport> {
    transport: T,
    mqtt: MqttConfig,
    channels: ChannelMap,
    state: ConnectionState,
    session: Option<SessionId>,
    subscriptions: Vec<String>,
}

impl<T: Transport> Bridge<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            mqtt: config.mqtt.clone(),
            channels: ChannelMap::new(&config.topics),
            state: ConnectionState::Disconnected,
            session: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Topics successfully subscribed in the current session
    #[cfg(test)]
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn start(&mut self) {
        if self.session.is_some() {
            debug!("Bridge already started");
            return;
        }
        match self.transport.connect(&self.mqtt) {
            Ok(session) => {
                debug!("Connecting to MQTT broker...");
                self.session = Some(session);
                self.state = ConnectionState::Connecting;
            }
            Err(e) => {
                error!("Failed to start MQTT connection: {}", e);
                self.state = ConnectionState::Disconnected;
            }
        }
    }

    pub async fn stop(&mut self) {
        if self.session.take().is_some() {
            info!("Stopping MQTT bridge");
        }
        self.transport.disconnect().await;
        self.subscriptions.clear();
        self.state = ConnectionState::Disconnected;
    }

    pub async fn restart(&mut self) {
        info!("Restarting MQTT bridge");
        self.stop().await;
        self.start();
    }

    pub async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        dispatcher: &mut InputDispatcher,
        actuator: &mut RelayActuator,
    ) {
        if self.session != Some(event.session()) {
            debug!("Ignoring event from stale session {}", event.session());
            return;
        }

        match event {
            TransportEvent::StateChanged { state, .. } => match state {
                ConnectionState::Connecting => {
                    debug!("Connecting to MQTT broker...");
                    self.state = ConnectionState::Connecting;
                }
                ConnectionState::Connected => {
                    self.state = ConnectionState::Connected;
                    self.subscribe_toggle_topics().await;
                    self.reconcile(dispatcher).await;
                }
                ConnectionState::Disconnected => {
                    warn!("Forcibly disconnected from the MQTT broker");
                    self.stop().await;
                }
            },
            TransportEvent::Message { message, .. } => {
                let Some(channel) = self.channels.channel_for_toggle_topic(message.topic()) else {
                    debug!("No channel for topic {}", message.topic());
                    return;
                };
                info!("Received toggle for {} on {}", channel, message.topic());
                if let Err(e) = actuator.pulse(channel).await {
                    warn!("{}", e);
                }
            }
        }
    }

    /// Publishes the level of `channel` on its status topic, retained
    pub async fn publish_status(&mut self, channel: Channel, level: Level) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(topic) = self.channels.status_topic_for_channel(channel) else {
            debug!("No status topic for {}", channel);
            return;
        };
        debug!("Publishing {} to {}", level.as_payload(), topic);
        if let Err(e) = self
            .transport
            .publish(topic, level.as_payload().as_bytes(), QoS::AtLeastOnce, true)
            .await
        {
            warn!("Failed to publish status of {}: {}", channel, e);
        }
    }

    /// Republishes every known channel state. Changes still queued in the
    /// dispatcher are absorbed first so the snapshot is current.
    pub async fn reconcile(&mut self, dispatcher: &mut InputDispatcher) {
        dispatcher.drain_pending();
        let snapshot = dispatcher.snapshot();
        debug!("Republishing {} channel states", snapshot.len());
        for (channel, level) in snapshot {
            self.publish_status(channel, level).await;
        }
    }

    async fn subscribe_toggle_topics(&mut self) {
        let topics: Vec<(String, Channel)> = self
            .channels
            .toggle_topics()
            .into_iter()
            .map(|(topic, channel)| (topic.to_string(), channel))
            .collect();

        for (topic, channel) in topics {
            match self.transport.subscribe(&topic, QoS::AtLeastOnce).await {
                Ok(()) => {
                    debug!("Subscribed to {} for {}", topic, channel);
                    self.subscriptions.push(topic);
                }
                Err(e) => warn!("Could not subscribe to {}, {} stays unbridged: {}", topic, channel, e),
            }
        }
    }
}

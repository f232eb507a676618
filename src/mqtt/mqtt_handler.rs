use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::MqttConfig;
use super::message_manager::MqttMessage;
use super::transport::{ConnectionState, SessionId, Transport, TransportError, TransportEvent};

const REQUEST_CAPACITY: usize = 100;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

struct ActiveSession {
    session: SessionId,
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

/// [`Transport`] on top of the rumqttc async client
pub struct MqttHandler {
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    last_session: SessionId,
    active: Option<ActiveSession>,
}

impl MqttHandler {
    pub fn new(event_sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            event_sender,
            last_session: 0,
            active: None,
        }
    }

    /// Drops the current session without telling the broker
    fn abandon(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Abandoning MQTT session {}", active.session);
            active.event_loop.abort();
        }
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        self.active
            .as_ref()
            .map(|active| &active.client)
            .ok_or(TransportError::NotConnected)
    }
}

impl Transport for MqttHandler {
    fn connect(&mut self, config: &MqttConfig) -> Result<SessionId, TransportError> {
        self.abandon();

        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqtt_options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            mqtt_options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        self.last_session += 1;
        let session = self.last_session;
        info!(
            "Connecting to MQTT broker {}:{} (session {})",
            config.host, config.port, session
        );
        // Receiver lives in the dispatch task, which owns this handler
        let _ = self.event_sender.send(TransportEvent::StateChanged {
            session,
            state: ConnectionState::Connecting,
        });

        let event_loop = tokio::spawn(run_event_loop(session, event_loop, self.event_sender.clone()));
        self.active = Some(ActiveSession {
            session,
            client,
            event_loop,
        });
        Ok(session)
    }

    async fn disconnect(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        debug!("Releasing MQTT session {}", active.session);

        // The event loop ends after writing DISCONNECT, or right away if the connection is gone
        let client = active.client.clone();
        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            if let Err(e) = client.disconnect().await {
                debug!("Disconnect request not delivered: {}", e);
            }
            let _ = (&mut active.event_loop).await;
        })
        .await;
        if flushed.is_err() {
            warn!(
                "MQTT session {} did not close within {:?}",
                active.session, DISCONNECT_TIMEOUT
            );
            active.event_loop.abort();
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client()?.subscribe(topic, qos).await?;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.client()?
            .publish(topic, qos, retain, payload.to_vec())
            .await?;
        Ok(())
    }
}

impl Drop for MqttHandler {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Drives one session until the connection ends. There is no reconnect; the
/// session reports `Disconnected` once and finishes.
async fn run_event_loop(
    session: SessionId,
    mut event_loop: EventLoop,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT broker (session {})", session);
                    TransportEvent::StateChanged {
                        session,
                        state: ConnectionState::Connected,
                    }
                } else {
                    warn!("MQTT broker refused the connection: {:?}", ack.code);
                    let _ = events.send(disconnected(session));
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = MqttMessage::from_topic(publish.topic, publish.payload.to_vec());
                debug!("Received {}", message);
                TransportEvent::Message { session, message }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Sent DISCONNECT for session {}", session);
                break;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT broker closed the connection");
                let _ = events.send(disconnected(session));
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                let _ = events.send(disconnected(session));
                break;
            }
        };

        if events.send(event).is_err() {
            debug!("Transport event receiver dropped, ending session {}", session);
            break;
        }
    }
}

fn disconnected(session: SessionId) -> TransportEvent {
    TransportEvent::StateChanged {
        session,
        state: ConnectionState::Disconnected,
    }
}

use rumqttc::QoS;

use super::config::MqttConfig;
use super::message_manager::MqttMessage;

/// Identifies one connection attempt. Every event is tagged with the session it belongs to.
pub type SessionId = u64;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged {
        session: SessionId,
        state: ConnectionState,
    },
    Message {
        session: SessionId,
        message: MqttMessage,
    },
}

impl TransportEvent {
    pub fn session(&self) -> SessionId {
        match self {
            TransportEvent::StateChanged { session, .. } => *session,
            TransportEvent::Message { session, .. } => *session,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No active connection")]
    NotConnected,

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Connection to the message broker.
///
/// State changes and incoming messages are delivered as [`TransportEvent`]s on
/// the channel the transport was created with. Requests wait for room in the
/// outgoing queue instead of being dropped.
#[allow(async_fn_in_trait)]
pub trait Transport: Send {
    /// Opens a new session. A session still open is abandoned.
    fn connect(&mut self, config: &MqttConfig) -> Result<SessionId, TransportError>;

    /// Ends the current session, if any. No further events are sent for it.
    async fn disconnect(&mut self);

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;
}

//! # MQTT Integration Module
//!
//! Connects the relay board to an MQTT broker. Remote clients toggle relays by
//! publishing to the toggle topics and observe the sensor inputs on the
//! retained status topics.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker address, credentials and client options
//! ├── message_manager.rs  - message representation
//! ├── transport.rs        - transport trait, connection states and events
//! ├── mqtt_handler.rs     - rumqttc implementation of the transport
//! └── bridge.rs           - connection lifecycle and topic/channel routing
//! ```
//!
//! There is no automatic reconnect. A lost connection tears the bridge down;
//! it comes back on an explicit restart (SIGHUP).

pub mod bridge;
pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
pub mod transport;

pub use bridge::Bridge;
pub use mqtt_handler::MqttHandler;
pub use transport::{ConnectionState, TransportEvent};

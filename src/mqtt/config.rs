use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1883;

/// Broker address and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            client_id: format!("relayboard-control-{}", std::process::id()),
            keep_alive: Duration::from_secs(30),
        }
    }
}

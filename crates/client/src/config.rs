//! Connection configuration.

use std::time::Duration;

use esphome_proto::noise::EncryptionKey;

/// Default native-API port.
pub const DEFAULT_PORT: u16 = 6053;

/// Client banner sent in the hello exchange.
pub const DEFAULT_CLIENT_INFO: &str = "ESPHome Rust Client";

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default keepalive ping cadence.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Default budget for a ping response.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default budget for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable options for one device connection.
///
/// Built with [`ConnectionConfig::new`] and chainable setters:
///
/// ```
/// use esphome_client::ConnectionConfig;
///
/// let config = ConnectionConfig::new("ceiling-fan.local")
///     .password("hunter2")
///     .reconnect(false);
/// assert_eq!(config.port, 6053);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device hostname or IP address.
    pub host: String,
    /// Device TCP port.
    pub port: u16,
    /// Optional API password.
    pub password: Option<String>,
    /// Optional pre-shared key; enables the Noise-encrypted transport.
    pub encryption_key: Option<EncryptionKey>,
    /// Client description reported to the device.
    pub client_info: String,
    /// Whether to reconnect automatically after an unexpected loss.
    pub reconnect: bool,
    /// Delay between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Keepalive ping cadence.
    pub ping_interval: Duration,
    /// Budget for a ping response before the connection is considered lost.
    pub ping_timeout: Duration,
    /// Budget for establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration for `host` with defaults for everything else.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            password: None,
            encryption_key: None,
            client_info: DEFAULT_CLIENT_INFO.to_string(),
            reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the device port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the API password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the pre-shared key, enabling the encrypted transport.
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets the client banner.
    pub fn client_info(mut self, client_info: impl Into<String>) -> Self {
        self.client_info = client_info.into();
        self
    }

    /// Enables or disables automatic reconnection.
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the delay between reconnection attempts.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the keepalive ping cadence.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the ping response budget.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the TCP connect budget.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The `host:port` dial string.
    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("node.local");
        assert_eq!(config.host, "node.local");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.password.is_none());
        assert!(config.encryption_key.is_none());
        assert_eq!(config.client_info, DEFAULT_CLIENT_INFO);
        assert!(config.reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_chain() {
        let config = ConnectionConfig::new("10.0.0.7")
            .port(16053)
            .password("secret")
            .client_info("integration test")
            .reconnect(false)
            .reconnect_interval(Duration::from_millis(100))
            .ping_interval(Duration::from_millis(200))
            .ping_timeout(Duration::from_millis(50))
            .connect_timeout(Duration::from_secs(1));

        assert_eq!(config.port, 16053);
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.client_info, "integration test");
        assert!(!config.reconnect);
        assert_eq!(config.address(), "10.0.0.7:16053");
    }
}

// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::time::Duration;

use crate::transport::RetryPolicy;

/// Default TPI listening port on the Envisalink module.
pub const DEFAULT_PORT: u16 = 4025;

/// Shortest keepalive period accepted; zero would make the poll timer panic.
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for a session with an Envisalink TPI.
#[derive(Debug, Clone)]
pub struct TpiConfig {
    /// Envisalink host name or IP address
    pub host: String,
    /// TPI port (default: 4025)
    pub port: u16,
    /// TPI password sent with NetworkLogin (default: "user")
    pub password: String,
    /// Interval between keepalive polls while Ready (default: 5s)
    pub keepalive_interval: Duration,
    /// Unit of the linear read backoff: failure N waits N x unit (default: 1s)
    pub read_retry_unit: Duration,
    /// Consecutive transient read failures before the session faults (default: 10)
    pub max_read_retries: u32,
    /// How long to wait for each step of the login handshake (default: 10s)
    pub auth_timeout: Duration,
    /// Reply timeout for the convenience command methods (default: 5s)
    pub reply_timeout: Duration,
    /// Maximum number of unclaimed messages kept in the inbox (default: 256)
    pub inbox_capacity: usize,
    /// Base delay between reconnect attempts (default: 10s)
    pub reconnect_delay: Duration,
    /// Longest accepted frame, delimiter excluded (default: 1024)
    pub max_frame_len: usize,
}

impl Default for TpiConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.50".to_string(),
            port: DEFAULT_PORT,
            password: "user".to_string(),
            keepalive_interval: Duration::from_secs(5),
            read_retry_unit: Duration::from_secs(1),
            max_read_retries: 10,
            auth_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(5),
            inbox_capacity: 256,
            reconnect_delay: Duration::from_secs(10),
            max_frame_len: 1024,
        }
    }
}

impl TpiConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> TpiConfigBuilder {
        TpiConfigBuilder::default()
    }

    /// The read retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_read_retries, self.read_retry_unit)
    }
}

/// Builder for TpiConfig.
#[derive(Debug, Clone, Default)]
pub struct TpiConfigBuilder {
    config: TpiConfig,
}

impl TpiConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Clamped to [`MIN_KEEPALIVE_INTERVAL`].
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval.max(MIN_KEEPALIVE_INTERVAL);
        self
    }

    pub fn read_retry_unit(mut self, unit: Duration) -> Self {
        self.config.read_retry_unit = unit;
        self
    }

    pub fn max_read_retries(mut self, retries: u32) -> Self {
        self.config.max_read_retries = retries;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.config.inbox_capacity = capacity;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn build(self) -> TpiConfig {
        self.config
    }
}

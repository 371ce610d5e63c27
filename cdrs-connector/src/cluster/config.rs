use derivative::Derivative;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::authenticators::{
    NoneAuthenticatorProvider, SaslAuthenticatorProvider, StaticPasswordAuthenticatorProvider,
};
use crate::cluster::TlsConfig;
use crate::compression::Compression;
use crate::error::ConfigurationError;

pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_QUERY_RETRY_COUNT: usize = 60;
pub const DEFAULT_MIN_RECONNECTION_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECTION_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Source of authentication for new connections.
pub trait AuthConf: fmt::Debug + Send + Sync {
    /// Creates the provider handing out authenticators for each new connection.
    fn authenticator_provider(&self) -> Arc<dyn SaslAuthenticatorProvider + Send + Sync>;
}

/// No authentication.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NoAuthConf;

impl AuthConf for NoAuthConf {
    fn authenticator_provider(&self) -> Arc<dyn SaslAuthenticatorProvider + Send + Sync> {
        Arc::new(NoneAuthenticatorProvider)
    }
}

/// Plain username and password authentication.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct PasswordAuthConf {
    username: String,
    #[derivative(Debug = "ignore")]
    password: String,
}

impl PasswordAuthConf {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        PasswordAuthConf {
            username: username.into(),
            password: password.into(),
        }
    }

    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl AuthConf for PasswordAuthConf {
    fn authenticator_provider(&self) -> Arc<dyn SaslAuthenticatorProvider + Send + Sync> {
        Arc::new(StaticPasswordAuthenticatorProvider::new(
            self.username.as_str(),
            self.password.as_str(),
        ))
    }
}

/// Immutable description of a cluster connection. Built with [`ConnectionConfigBuilder`], which
/// validates all values up front.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    hosts: Vec<String>,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    query_retry_count: usize,
    min_reconnection_delay: Duration,
    max_reconnection_delay: Duration,
    local_dc: Option<String>,
    auth_conf: Arc<dyn AuthConf>,
    compression: Compression,
    tls: TlsConfig,
    heartbeat_interval: Duration,
    tcp_nodelay: bool,
}

impl ConnectionConfig {
    /// Contact hosts, in configuration order and without duplicates.
    #[inline]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[inline]
    pub fn query_retry_count(&self) -> usize {
        self.query_retry_count
    }

    #[inline]
    pub fn min_reconnection_delay(&self) -> Duration {
        self.min_reconnection_delay
    }

    #[inline]
    pub fn max_reconnection_delay(&self) -> Duration {
        self.max_reconnection_delay
    }

    #[inline]
    pub fn local_dc(&self) -> Option<&str> {
        self.local_dc.as_deref()
    }

    #[inline]
    pub fn auth_conf(&self) -> &Arc<dyn AuthConf> {
        &self.auth_conf
    }

    #[inline]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    #[inline]
    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    #[inline]
    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }
}

/// Builder structure that helps to configure a cluster connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    hosts: Vec<String>,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    query_retry_count: usize,
    min_reconnection_delay: Duration,
    max_reconnection_delay: Duration,
    local_dc: Option<String>,
    auth_conf: Arc<dyn AuthConf>,
    compression: Compression,
    tls: TlsConfig,
    heartbeat_interval: Duration,
    tcp_nodelay: bool,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        ConnectionConfigBuilder {
            hosts: vec![],
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            query_retry_count: DEFAULT_QUERY_RETRY_COUNT,
            min_reconnection_delay: DEFAULT_MIN_RECONNECTION_DELAY,
            max_reconnection_delay: DEFAULT_MAX_RECONNECTION_DELAY,
            local_dc: None,
            auth_conf: Arc::new(NoAuthConf),
            compression: Compression::None,
            tls: TlsConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            tcp_nodelay: true,
        }
    }
}

impl ConnectionConfigBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a contact host (name or IP address, without port).
    pub fn with_contact_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    pub fn with_contact_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-request read timeout. Zero disables it.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_query_retry_count(mut self, count: usize) -> Self {
        self.query_retry_count = count;
        self
    }

    pub fn with_reconnection_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_reconnection_delay = min;
        self.max_reconnection_delay = max;
        self
    }

    pub fn with_local_dc(mut self, local_dc: impl Into<String>) -> Self {
        self.local_dc = Some(local_dc.into());
        self
    }

    pub fn with_auth_conf(mut self, auth_conf: Arc<dyn AuthConf>) -> Self {
        self.auth_conf = auth_conf;
        self
    }

    pub fn with_password_auth(
        self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.with_auth_conf(Arc::new(PasswordAuthConf::new(username, password)))
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_tcp_nodelay(mut self, tcp_nodelay: bool) -> Self {
        self.tcp_nodelay = tcp_nodelay;
        self
    }

    /// Validates and finalizes building process.
    pub fn build(self) -> Result<ConnectionConfig, ConfigurationError> {
        let hosts = self
            .hosts
            .iter()
            .map(|host| host.trim())
            .filter(|host| !host.is_empty())
            .unique()
            .map(str::to_string)
            .collect_vec();

        if hosts.is_empty() {
            return Err(ConfigurationError::NoContactHosts);
        }

        if self.port == 0 {
            return Err(ConfigurationError::InvalidPort(0));
        }

        if self.min_reconnection_delay > self.max_reconnection_delay {
            return Err(ConfigurationError::ReconnectionDelayRange {
                min_ms: self.min_reconnection_delay.as_millis() as u64,
                max_ms: self.max_reconnection_delay.as_millis() as u64,
            });
        }

        if self.heartbeat_interval.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                name: "heartbeat_interval".into(),
                value: "0".into(),
            });
        }

        Ok(ConnectionConfig {
            hosts,
            port: self.port,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            query_retry_count: self.query_retry_count,
            min_reconnection_delay: self.min_reconnection_delay,
            max_reconnection_delay: self.max_reconnection_delay,
            local_dc: self.local_dc.filter(|dc| !dc.is_empty()),
            auth_conf: self.auth_conf,
            compression: self.compression,
            tls: self.tls,
            heartbeat_interval: self.heartbeat_interval,
            tcp_nodelay: self.tcp_nodelay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticators::PASSWORD_AUTHENTICATOR;

    #[test]
    fn should_accept_equal_reconnection_delays() {
        let config = ConnectionConfigBuilder::new()
            .with_contact_host("10.0.0.1")
            .with_reconnection_delay(Duration::from_secs(5), Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.min_reconnection_delay(), config.max_reconnection_delay());
    }

    #[test]
    fn should_reject_inverted_reconnection_delays() {
        let result = ConnectionConfigBuilder::new()
            .with_contact_host("10.0.0.1")
            .with_reconnection_delay(Duration::from_millis(2000), Duration::from_millis(1000))
            .build();

        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::ReconnectionDelayRange {
                min_ms: 2000,
                max_ms: 1000
            }
        );
    }

    #[test]
    fn should_require_contact_hosts() {
        assert_eq!(
            ConnectionConfigBuilder::new()
                .with_contact_host("  ")
                .build()
                .unwrap_err(),
            ConfigurationError::NoContactHosts
        );
    }

    #[test]
    fn should_reject_zero_port() {
        assert_eq!(
            ConnectionConfigBuilder::new()
                .with_contact_host("h")
                .with_port(0)
                .build()
                .unwrap_err(),
            ConfigurationError::InvalidPort(0)
        );
    }

    #[test]
    fn should_deduplicate_hosts_keeping_order() {
        let config = ConnectionConfigBuilder::new()
            .with_contact_hosts(["10.0.0.2", "10.0.0.1", " 10.0.0.2"])
            .build()
            .unwrap();

        assert_eq!(config.hosts(), ["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn should_apply_defaults() {
        let config = ConnectionConfigBuilder::new()
            .with_contact_host("h")
            .build()
            .unwrap();

        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.compression(), Compression::None);
        assert!(!config.tls().enabled);
        assert!(config.tcp_nodelay());
        assert_eq!(config.local_dc(), None);
        assert_eq!(config.auth_conf().authenticator_provider().name(), None);
    }

    #[test]
    fn should_create_password_provider() {
        let config = ConnectionConfigBuilder::new()
            .with_contact_host("h")
            .with_password_auth("user", "pass")
            .build()
            .unwrap();

        let provider = config.auth_conf().authenticator_provider();
        assert_eq!(provider.name(), Some(PASSWORD_AUTHENTICATOR));
        assert!(!format!("{:?}", config.auth_conf()).contains("pass\""));
    }
}

//! Transmittable connection settings. A [`ConnectorSettings`] map is what travels between
//! processes; the receiving side validates it, turns it into a [`ConnectionConfig`] and hands it
//! to a locally resolved [`ConnectionFactory`].
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::cluster::{
    ConnectionConfig, ConnectionConfigBuilder, TlsConfig, DEFAULT_MAX_RECONNECTION_DELAY,
    DEFAULT_MIN_RECONNECTION_DELAY,
};
use crate::compression::Compression;
use crate::error::{ConfigurationError, Result};
use crate::factory::ConnectionFactory;

/// Optional prefix accepted in front of every option name.
pub const PROPERTY_PREFIX: &str = "cassandra.";

pub const FACTORY: &str = "connection.factory";
pub const HOST: &str = "connection.host";
pub const PORT: &str = "connection.port";
pub const CONNECT_TIMEOUT_MS: &str = "connection.timeout_ms";
pub const READ_TIMEOUT_MS: &str = "read.timeout_ms";
pub const QUERY_RETRY_COUNT: &str = "query.retry.count";
pub const MIN_RECONNECTION_DELAY_MS: &str = "connection.reconnection_delay_ms.min";
pub const MAX_RECONNECTION_DELAY_MS: &str = "connection.reconnection_delay_ms.max";
pub const LOCAL_DC: &str = "connection.local_dc";
pub const COMPRESSION: &str = "connection.compression";
pub const KEEP_ALIVE_MS: &str = "connection.keep_alive_ms";
pub const USERNAME: &str = "auth.username";
pub const PASSWORD: &str = "auth.password";
pub const SSL_ENABLED: &str = "connection.ssl.enabled";
pub const SSL_TRUST_STORE_PATH: &str = "connection.ssl.trustStore.path";
pub const SSL_TRUST_STORE_TYPE: &str = "connection.ssl.trustStore.type";
pub const SSL_TRUST_STORE_PASSWORD: &str = "connection.ssl.trustStore.password";
pub const SSL_PROTOCOL: &str = "connection.ssl.protocol";
pub const SSL_ENABLED_ALGORITHMS: &str = "connection.ssl.enabledAlgorithms";

/// All option names understood without a custom factory.
pub const STANDARD_PROPERTIES: &[&str] = &[
    FACTORY,
    HOST,
    PORT,
    CONNECT_TIMEOUT_MS,
    READ_TIMEOUT_MS,
    QUERY_RETRY_COUNT,
    MIN_RECONNECTION_DELAY_MS,
    MAX_RECONNECTION_DELAY_MS,
    LOCAL_DC,
    COMPRESSION,
    KEEP_ALIVE_MS,
    USERNAME,
    PASSWORD,
    SSL_ENABLED,
    SSL_TRUST_STORE_PATH,
    SSL_TRUST_STORE_TYPE,
    SSL_TRUST_STORE_PASSWORD,
    SSL_PROTOCOL,
    SSL_ENABLED_ALGORITHMS,
];

#[inline]
fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(PROPERTY_PREFIX).unwrap_or(name)
}

/// Option name to value map describing a connection request. Names may carry the
/// [`PROPERTY_PREFIX`]; values are always strings, as they come from external configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorSettings {
    properties: BTreeMap<String, String>,
}

impl From<BTreeMap<String, String>> for ConnectorSettings {
    fn from(properties: BTreeMap<String, String>) -> Self {
        ConnectorSettings { properties }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectorSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ConnectorSettings {
            properties: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl ConnectorSettings {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties.insert(name.into(), value.into())
    }

    /// Returns the value of an option, given without the prefix. A prefixed entry takes
    /// precedence over an unprefixed one.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|(_, value)| value)
    }

    /// Like [`get`](ConnectorSettings::get), but also returns the name the option was set under.
    pub fn entry(&self, name: &str) -> Option<(&str, &str)> {
        self.properties
            .get_key_value(&format!("{PROPERTY_PREFIX}{name}"))
            .or_else(|| self.properties.get_key_value(name))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Option names as given, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Name of the selected factory, if any.
    pub fn factory_name(&self) -> Option<&str> {
        self.get(FACTORY)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|error| ConfigurationError::MalformedSettings(error.to_string()).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|error| ConfigurationError::MalformedSettings(error.to_string()).into())
    }

    /// Checks all option names are either standard or recognized by given factory. Unknown names
    /// are reported together, sorted.
    pub fn validate(&self, factory: &dyn ConnectionFactory) -> Result<()> {
        let recognized = factory.recognized_properties();

        let unknown: Vec<String> = self
            .names()
            .filter(|name| {
                !STANDARD_PROPERTIES.contains(&strip_prefix(name))
                    && !recognized.contains(*name)
                    && !recognized.contains(strip_prefix(name))
            })
            .map(str::to_string)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownProperties(unknown).into())
        }
    }

    /// Builds a connection configuration from standard options. Unset options keep their
    /// defaults.
    pub fn to_connection_config(&self) -> Result<ConnectionConfig> {
        let mut builder = ConnectionConfigBuilder::new();

        if let Some(hosts) = self.get(HOST) {
            builder = builder.with_contact_hosts(hosts.split(','));
        }

        if let Some((name, port)) = self.entry(PORT) {
            builder = builder.with_port(parse_port(name, port)?);
        }

        if let Some(timeout) = self.duration(CONNECT_TIMEOUT_MS)? {
            builder = builder.with_connect_timeout(timeout);
        }

        if let Some(timeout) = self.duration(READ_TIMEOUT_MS)? {
            builder = builder.with_read_timeout(timeout);
        }

        if let Some(count) = self.parsed::<usize>(QUERY_RETRY_COUNT)? {
            builder = builder.with_query_retry_count(count);
        }

        let min_delay = self
            .duration(MIN_RECONNECTION_DELAY_MS)?
            .unwrap_or(DEFAULT_MIN_RECONNECTION_DELAY);
        let max_delay = self
            .duration(MAX_RECONNECTION_DELAY_MS)?
            .unwrap_or(DEFAULT_MAX_RECONNECTION_DELAY);
        builder = builder.with_reconnection_delay(min_delay, max_delay);

        if let Some(local_dc) = self.get(LOCAL_DC) {
            builder = builder.with_local_dc(local_dc.trim());
        }

        if let Some((name, compression)) = self.entry(COMPRESSION) {
            let compression =
                Compression::from_str(compression).map_err(|_| invalid(name, compression))?;
            builder = builder.with_compression(compression);
        }

        if let Some(interval) = self.duration(KEEP_ALIVE_MS)? {
            if interval.is_zero() {
                let (name, value) = self.entry(KEEP_ALIVE_MS).unwrap_or((KEEP_ALIVE_MS, "0"));
                return Err(invalid(name, value).into());
            }

            builder = builder.with_heartbeat_interval(interval);
        }

        if let Some(username) = self.get(USERNAME) {
            builder = builder.with_password_auth(username, self.get(PASSWORD).unwrap_or_default());
        }

        builder = builder.with_tls(self.tls_config()?);

        Ok(builder.build()?)
    }

    fn tls_config(&self) -> Result<TlsConfig> {
        let mut tls = TlsConfig {
            enabled: self.parsed_bool(SSL_ENABLED)?.unwrap_or_default(),
            ..Default::default()
        };

        if let Some(path) = self.get(SSL_TRUST_STORE_PATH).map(str::trim) {
            if !path.is_empty() {
                tls.trust_store_path = Some(path.into());
            }
        }

        if let Some(store_type) = self.get(SSL_TRUST_STORE_TYPE) {
            tls.trust_store_type = store_type.trim().parse()?;
        }

        tls.trust_store_password = self.get(SSL_TRUST_STORE_PASSWORD).map(str::to_string);

        if let Some(protocol) = self.get(SSL_PROTOCOL) {
            tls.protocol = protocol.trim().parse()?;
        }

        if let Some(algorithms) = self.get(SSL_ENABLED_ALGORITHMS) {
            tls.enabled_cipher_suites = algorithms
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(tls)
    }

    fn parsed<V: FromStr>(&self, name: &str) -> Result<Option<V>> {
        self.entry(name)
            .map(|(name, value)| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(name, value).into())
            })
            .transpose()
    }

    fn parsed_bool(&self, name: &str) -> Result<Option<bool>> {
        self.entry(name)
            .map(|(name, value)| match value.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(name, value).into()),
            })
            .transpose()
    }

    fn duration(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parsed::<u64>(name)?.map(Duration::from_millis))
    }
}

fn invalid(name: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_port(name: &str, value: &str) -> std::result::Result<u16, ConfigurationError> {
    let port: i64 = value.trim().parse().map_err(|_| invalid(name, value))?;
    u16::try_from(port)
        .ok()
        .filter(|port| *port > 0)
        .ok_or(ConfigurationError::InvalidPort(port))
}

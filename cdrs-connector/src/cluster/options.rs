use derive_more::Constructor;
use std::time::Duration;

use crate::cluster::topology::NodeDistance;
use crate::error::ConfigurationError;

/// Core connections opened to each local node.
pub const LOCAL_CORE_CONNECTIONS: usize = 2;
/// Upper bound of connections to each local node.
pub const LOCAL_MAX_CONNECTIONS: usize = 10;
/// Core connections opened to each remote node.
pub const REMOTE_CORE_CONNECTIONS: usize = 2;
/// Upper bound of connections to each remote node.
pub const REMOTE_MAX_CONNECTIONS: usize = 2048;
/// Concurrent requests allowed on a single connection to a local node.
pub const LOCAL_MAX_REQUESTS_PER_CONNECTION: usize = 16536;
/// Concurrent requests allowed on a single connection to a remote node.
pub const REMOTE_MAX_REQUESTS_PER_CONNECTION: usize = 256;

/// Low level socket settings, applied to every connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Constructor)]
pub struct SocketOptions {
    connect_timeout: Duration,
    read_timeout: Duration,
    tcp_nodelay: bool,
}

impl SocketOptions {
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Per-request read timeout. `None` when disabled.
    #[inline]
    pub fn read_timeout(&self) -> Option<Duration> {
        (!self.read_timeout.is_zero()).then_some(self.read_timeout)
    }

    #[inline]
    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }
}

/// Pool sizing for a single node distance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Constructor)]
pub struct PoolSize {
    pub core_connections: usize,
    pub max_connections: usize,
    pub max_requests_per_connection: usize,
}

impl PoolSize {
    fn validate(&self, distance: &str) -> Result<(), ConfigurationError> {
        if self.core_connections == 0
            || self.max_connections < self.core_connections
            || self.max_requests_per_connection == 0
        {
            return Err(ConfigurationError::InvalidValue {
                name: format!("{distance}_pool_size"),
                value: format!("{self:?}"),
            });
        }

        Ok(())
    }
}

/// Connection pool sizing per node distance, along with heartbeat settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PoolingOptions {
    local: PoolSize,
    remote: PoolSize,
    heartbeat_interval: Duration,
}

impl PoolingOptions {
    /// Custom pool sizes. Every distance needs at least one core connection, a maximum not below
    /// the core size and room for at least one request per connection.
    pub fn new(
        local: PoolSize,
        remote: PoolSize,
        heartbeat_interval: Duration,
    ) -> Result<Self, ConfigurationError> {
        local.validate("local")?;
        remote.validate("remote")?;

        Ok(PoolingOptions {
            local,
            remote,
            heartbeat_interval,
        })
    }

    /// Fixed pool sizes: 2 to 10 connections per local node, 2 to 2048 per remote one.
    pub fn with_heartbeat_interval(heartbeat_interval: Duration) -> Self {
        PoolingOptions {
            local: PoolSize::new(
                LOCAL_CORE_CONNECTIONS,
                LOCAL_MAX_CONNECTIONS,
                LOCAL_MAX_REQUESTS_PER_CONNECTION,
            ),
            remote: PoolSize::new(
                REMOTE_CORE_CONNECTIONS,
                REMOTE_MAX_CONNECTIONS,
                REMOTE_MAX_REQUESTS_PER_CONNECTION,
            ),
            heartbeat_interval,
        }
    }

    #[inline]
    pub fn pool_size(&self, distance: NodeDistance) -> PoolSize {
        match distance {
            NodeDistance::Local => self.local,
            NodeDistance::Remote => self.remote,
        }
    }

    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}

//! Cluster connection configuration, per-node connection management and the established
//! [`Cluster`] handle.
pub use crate::cluster::builder::{ClusterBuilder, DEFAULT_TRANSPORT_BUFFER_SIZE};
pub use crate::cluster::config::{
    AuthConf, ConnectionConfig, ConnectionConfigBuilder, NoAuthConf, PasswordAuthConf,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_RECONNECTION_DELAY,
    DEFAULT_MIN_RECONNECTION_DELAY, DEFAULT_PORT, DEFAULT_QUERY_RETRY_COUNT, DEFAULT_READ_TIMEOUT,
};
pub use crate::cluster::connection_manager::{startup, ConnectionManager};
pub use crate::cluster::connection_pool::{ConnectionPool, PooledConnection};
pub use crate::cluster::established::Cluster;
pub use crate::cluster::node_address::NodeAddress;
pub use crate::cluster::node_info::NodeInfo;
pub use crate::cluster::options::{
    PoolSize, PoolingOptions, SocketOptions, LOCAL_CORE_CONNECTIONS, LOCAL_MAX_CONNECTIONS,
    LOCAL_MAX_REQUESTS_PER_CONNECTION, REMOTE_CORE_CONNECTIONS, REMOTE_MAX_CONNECTIONS,
    REMOTE_MAX_REQUESTS_PER_CONNECTION,
};
pub use crate::cluster::rustls_connection_manager::RustlsConnectionManager;
pub use crate::cluster::send_envelope::send_envelope;
pub use crate::cluster::tcp_connection_manager::TcpConnectionManager;
pub use crate::cluster::tls_config::{TlsConfig, TlsProtocol, TrustStoreType};

mod builder;
mod config;
mod connection_manager;
mod connection_pool;
mod established;
mod node_address;
mod node_info;
mod options;
mod rustls_connection_manager;
mod send_envelope;
mod tcp_connection_manager;
mod tls_config;
pub mod topology;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::*;

use crate::authenticators::{NoneAuthenticatorProvider, SaslAuthenticatorProvider};
use crate::cluster::connection_pool::ConnectionPoolFactory;
use crate::cluster::topology::Node;
use crate::cluster::{
    Cluster, ConnectionManager, NodeAddress, NodeInfo, PoolingOptions, RustlsConnectionManager,
    SocketOptions, TcpConnectionManager, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
};
use crate::compression::Compression;
use crate::error::{ConfigurationError, ConnectionError, Result};
use crate::frame::Version;
use crate::load_balancing::{DcAwareRoundRobinPolicy, LoadBalancingPolicy};
use crate::retry::{
    ExponentialReconnectionPolicy, MultipleRetryPolicy, ReconnectionPolicy, RetryPolicy,
};
use crate::tls::SecurityOptions;
use crate::transport::{CdrsTransport, Transport};

/// Capacity of the request queue of a single connection.
pub const DEFAULT_TRANSPORT_BUFFER_SIZE: usize = 1024;

/// Builder of a [`Cluster`]. Holds everything needed to connect, but does not touch the network
/// until [`build`](ClusterBuilder::build) is called.
pub struct ClusterBuilder<T: CdrsTransport + 'static = Transport> {
    contact_hosts: Vec<String>,
    port: u16,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    load_balancing: Arc<dyn LoadBalancingPolicy<T>>,
    authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    compression: Compression,
    pooling_options: PoolingOptions,
    socket_options: SocketOptions,
    security_options: Option<SecurityOptions>,
    version: Version,
    transport_buffer_size: usize,
}

impl<T: CdrsTransport> Debug for ClusterBuilder<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterBuilder")
            .field("contact_hosts", &self.contact_hosts)
            .field("port", &self.port)
            .field("compression", &self.compression)
            .field("pooling_options", &self.pooling_options)
            .field("socket_options", &self.socket_options)
            .field("security_options", &self.security_options)
            .field("version", &self.version)
            .finish()
    }
}

impl<T: CdrsTransport + 'static> ClusterBuilder<T> {
    /// Creates a builder with given contact hosts and default settings: exponential
    /// reconnection, retrying up to 3 times, round-robin load balancing without a preferred
    /// datacenter, no authentication, no compression and no TLS.
    pub fn new<I, S>(contact_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClusterBuilder {
            contact_hosts: contact_hosts.into_iter().map(Into::into).collect(),
            port: DEFAULT_PORT,
            retry_policy: Arc::new(MultipleRetryPolicy::new(3)),
            reconnection_policy: Arc::new(ExponentialReconnectionPolicy::default()),
            load_balancing: Arc::new(DcAwareRoundRobinPolicy::default()),
            authenticator_provider: Arc::new(NoneAuthenticatorProvider),
            compression: Compression::None,
            pooling_options: PoolingOptions::with_heartbeat_interval(DEFAULT_HEARTBEAT_INTERVAL),
            socket_options: SocketOptions::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, true),
            security_options: None,
            version: Version::V4,
            transport_buffer_size: DEFAULT_TRANSPORT_BUFFER_SIZE,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_reconnection_policy(
        mut self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        self.reconnection_policy = reconnection_policy;
        self
    }

    pub fn with_load_balancing_policy(
        mut self,
        load_balancing: Arc<dyn LoadBalancingPolicy<T>>,
    ) -> Self {
        self.load_balancing = load_balancing;
        self
    }

    pub fn with_authenticator_provider(
        mut self,
        authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    ) -> Self {
        self.authenticator_provider = authenticator_provider;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_pooling_options(mut self, pooling_options: PoolingOptions) -> Self {
        self.pooling_options = pooling_options;
        self
    }

    pub fn with_socket_options(mut self, socket_options: SocketOptions) -> Self {
        self.socket_options = socket_options;
        self
    }

    /// Enables TLS with given context.
    pub fn with_security_options(mut self, security_options: SecurityOptions) -> Self {
        self.security_options = Some(security_options);
        self
    }

    /// Sets the capacity of the request queue of a single connection.
    pub fn with_transport_buffer_size(mut self, transport_buffer_size: usize) -> Self {
        self.transport_buffer_size = transport_buffer_size;
        self
    }

    #[inline]
    pub fn contact_hosts(&self) -> &[String] {
        &self.contact_hosts
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn retry_policy(&self) -> &(dyn RetryPolicy + Send + Sync) {
        self.retry_policy.as_ref()
    }

    #[inline]
    pub fn reconnection_policy(&self) -> &(dyn ReconnectionPolicy + Send + Sync) {
        self.reconnection_policy.as_ref()
    }

    #[inline]
    pub fn load_balancing_policy(&self) -> &dyn LoadBalancingPolicy<T> {
        self.load_balancing.as_ref()
    }

    #[inline]
    pub fn authenticator_provider(&self) -> &(dyn SaslAuthenticatorProvider + Send + Sync) {
        self.authenticator_provider.as_ref()
    }

    #[inline]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    #[inline]
    pub fn pooling_options(&self) -> &PoolingOptions {
        &self.pooling_options
    }

    #[inline]
    pub fn socket_options(&self) -> &SocketOptions {
        &self.socket_options
    }

    #[inline]
    pub fn security_options(&self) -> Option<&SecurityOptions> {
        self.security_options.as_ref()
    }

    /// Connects using given connection manager. Contact hosts are resolved and probed for their
    /// location first; unreachable hosts are skipped, as long as at least one node can be
    /// connected to. Rejected credentials fail the whole build immediately.
    pub async fn build_with_connection_manager(
        self,
        connection_manager: Arc<dyn ConnectionManager<T>>,
    ) -> Result<Cluster<T>> {
        if self.contact_hosts.is_empty() {
            return Err(ConfigurationError::NoContactHosts.into());
        }

        let mut last_error = None;

        let mut addresses = vec![];
        for host in &self.contact_hosts {
            match NodeAddress::resolve(host, self.port).await {
                Ok(resolved) => addresses.extend(resolved),
                Err(error) => {
                    warn!(%error, "Cannot resolve contact host.");
                    last_error = Some(error);
                }
            }
        }

        let mut nodes = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.probe(connection_manager.as_ref(), &address).await {
                Ok(info) => nodes.push(Arc::new(Node::new(address, info.datacenter, info.rack))),
                Err(error) if error.is_authentication() => return Err(error.into()),
                Err(error) => {
                    warn!(%error, "Cannot connect to contact host.");
                    last_error = Some(error);
                }
            }
        }

        if nodes.is_empty() {
            return Err(Self::no_nodes_error(last_error));
        }

        self.load_balancing.init(&nodes);

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let pool_factory = ConnectionPoolFactory::new(
            self.pooling_options,
            self.version,
            connection_manager.clone(),
            self.reconnection_policy.clone(),
            shutdown_receiver,
        );

        for node in &nodes {
            let distance = self.load_balancing.distance(node);
            match pool_factory
                .create(distance, Arc::downgrade(node), node.address().clone())
                .await
            {
                Ok(pool) => {
                    node.attach_pool(pool);
                    node.mark_up();
                    debug!(address = %node.address(), ?distance, "Node up.");
                }
                Err(error) if error.is_authentication() => {
                    shutdown_sender.send_replace(true);
                    return Err(error.into());
                }
                Err(error) => {
                    warn!(%error, "Cannot open connection pool.");
                    node.mark_down();
                    last_error = Some(error);
                }
            }
        }

        if !nodes.iter().any(|node| node.is_up()) {
            shutdown_sender.send_replace(true);
            return Err(Self::no_nodes_error(last_error));
        }

        let cluster = Cluster::new(
            nodes,
            self.load_balancing,
            self.retry_policy,
            self.reconnection_policy,
            self.pooling_options,
            self.socket_options,
            connection_manager,
            shutdown_sender,
        );

        info!(
            id = %cluster.id(),
            nodes = cluster.nodes().len(),
            "Connected to cluster."
        );

        Ok(cluster)
    }

    async fn probe(
        &self,
        connection_manager: &dyn ConnectionManager<T>,
        address: &NodeAddress,
    ) -> std::result::Result<NodeInfo, ConnectionError> {
        let transport = connection_manager.connection(address.clone(), None).await?;

        Ok(NodeInfo::fetch(&transport, self.version)
            .await
            .unwrap_or_else(|error| {
                debug!(%address, %error, "Cannot read node location.");
                NodeInfo::default()
            }))
    }

    fn no_nodes_error(last_error: Option<ConnectionError>) -> crate::Error {
        match last_error {
            Some(error) => error.into(),
            None => ConfigurationError::NoContactHosts.into(),
        }
    }
}

impl ClusterBuilder<Transport> {
    /// Connects to the cluster, over TLS if security options are present.
    pub async fn build(self) -> Result<Cluster> {
        let connection_manager: Arc<dyn ConnectionManager<Transport>> =
            match &self.security_options {
                Some(security_options) => Arc::new(RustlsConnectionManager::new(
                    self.authenticator_provider.clone(),
                    security_options.client_config(),
                    self.socket_options,
                    self.compression,
                    self.transport_buffer_size,
                    self.version,
                )),
                None => Arc::new(TcpConnectionManager::new(
                    self.authenticator_provider.clone(),
                    self.socket_options,
                    self.compression,
                    self.transport_buffer_size,
                    self.version,
                )),
            };

        self.build_with_connection_manager(connection_manager).await
    }
}

use futures::FutureExt;
use std::sync::Arc;
use tracing::*;

use crate::cluster::{Cluster, ClusterBuilder, ConnectionConfig, PoolingOptions, SocketOptions};
use crate::error::Result;
use crate::factory::ConnectionFactory;
use crate::future::BoxFuture;
use crate::load_balancing::DcAwareRoundRobinPolicy;
use crate::retry::{ExponentialReconnectionPolicy, MultipleRetryPolicy};
use crate::tls::{build_security_options, SecurityOptions};
use crate::transport::Transport;

/// Factory connecting with fixed pool sizes, exponential reconnection, a bounded number of query
/// retries and datacenter-aware round-robin load balancing. Understands no options beyond the
/// standard ones.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DefaultConnectionFactory;

impl DefaultConnectionFactory {
    /// Translates given configuration into a cluster builder, without touching the network. TLS
    /// trust material is loaded here, so a broken trust store fails before any connection is
    /// attempted.
    pub fn configure(&self, config: &ConnectionConfig) -> Result<ClusterBuilder> {
        let socket_options = SocketOptions::new(
            config.connect_timeout(),
            config.read_timeout(),
            config.tcp_nodelay(),
        );

        let builder = ClusterBuilder::<Transport>::new(config.hosts().iter().cloned())
            .with_port(config.port())
            .with_socket_options(socket_options)
            .with_pooling_options(PoolingOptions::with_heartbeat_interval(
                config.heartbeat_interval(),
            ))
            .with_retry_policy(Arc::new(MultipleRetryPolicy::new(
                config.query_retry_count(),
            )))
            .with_reconnection_policy(Arc::new(ExponentialReconnectionPolicy::new(
                config.min_reconnection_delay(),
                config.max_reconnection_delay(),
            )))
            .with_load_balancing_policy(Arc::new(DcAwareRoundRobinPolicy::new(
                config.local_dc().map(str::to_string),
            )))
            .with_authenticator_provider(config.auth_conf().authenticator_provider())
            .with_compression(config.compression());

        let tls = config.tls();
        if !tls.enabled {
            return Ok(builder);
        }

        let security_options = match build_security_options(tls)? {
            Some(security_options) => security_options,
            None => {
                warn!(
                    hosts = ?config.hosts(),
                    "TLS enabled without a trust store - using default trust roots."
                );
                SecurityOptions::default_trust()?
            }
        };

        Ok(builder.with_security_options(security_options))
    }
}

impl ConnectionFactory for DefaultConnectionFactory {
    fn create_cluster(&self, config: ConnectionConfig) -> BoxFuture<'_, Result<Cluster>> {
        async move {
            let builder = self.configure(&config)?;
            debug!(?builder, "Creating cluster connection.");

            builder.build().await
        }
        .boxed()
    }
}

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::*;
use uuid::Uuid;

use crate::cluster::send_envelope::send_envelope;
use crate::cluster::topology::Node;
use crate::cluster::{ConnectionManager, PoolingOptions, SocketOptions};
use crate::frame::Envelope;
use crate::load_balancing::{LoadBalancingPolicy, QueryPlan};
use crate::protocol_error::{Error, Result};
use crate::retry::{ReconnectionPolicy, RetryPolicy};
use crate::transport::{CdrsTransport, Transport};

/// Established connection to a cluster. Owns connection pools to all nodes, along with their
/// heartbeat and reconnection tasks.
///
/// Background tasks stop when the cluster is dropped or [`shutdown`](Cluster::shutdown) is
/// called.
pub struct Cluster<T: CdrsTransport + 'static = Transport> {
    id: Uuid,
    nodes: Vec<Arc<Node<T>>>,
    load_balancing: Arc<dyn LoadBalancingPolicy<T>>,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    pooling_options: PoolingOptions,
    socket_options: SocketOptions,
    // pools hold only weak references to it
    _connection_manager: Arc<dyn ConnectionManager<T>>,
    shutdown: watch::Sender<bool>,
}

impl<T: CdrsTransport> Debug for Cluster<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .field("pooling_options", &self.pooling_options)
            .field("socket_options", &self.socket_options)
            .finish()
    }
}

impl<T: CdrsTransport> Drop for Cluster<T> {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl<T: CdrsTransport + 'static> Cluster<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        nodes: Vec<Arc<Node<T>>>,
        load_balancing: Arc<dyn LoadBalancingPolicy<T>>,
        retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
        pooling_options: PoolingOptions,
        socket_options: SocketOptions,
        connection_manager: Arc<dyn ConnectionManager<T>>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Cluster {
            id: Uuid::new_v4(),
            nodes,
            load_balancing,
            retry_policy,
            reconnection_policy,
            pooling_options,
            socket_options,
            _connection_manager: connection_manager,
            shutdown,
        }
    }

    /// Unique id of this connection, for telling connections apart in logs.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// All nodes known to this connection, including ones which are down.
    #[inline]
    pub fn nodes(&self) -> &[Arc<Node<T>>] {
        &self.nodes
    }

    #[inline]
    pub fn load_balancing_policy(&self) -> &dyn LoadBalancingPolicy<T> {
        self.load_balancing.as_ref()
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
    pub fn pooling_options(&self) -> &PoolingOptions {
        &self.pooling_options
    }

    #[inline]
    pub fn socket_options(&self) -> &SocketOptions {
        &self.socket_options
    }

    /// Returns the nodes a new request would be sent to, in order.
    pub fn query_plan(&self) -> QueryPlan<T> {
        self.load_balancing.query_plan(&self.nodes)
    }

    /// Checks if [`shutdown`](Cluster::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sends an envelope to the cluster, retrying on another node or the same one, as the retry
    /// policy decides.
    pub async fn send_envelope(&self, envelope: &Envelope, is_idempotent: bool) -> Result<Envelope> {
        if self.is_shut_down() {
            return Err(Error::General(format!("Cluster {} is shut down", self.id)));
        }

        let query_plan = self.query_plan();
        send_envelope(
            query_plan.nodes.into_iter(),
            envelope,
            is_idempotent,
            self.retry_policy.new_session(),
        )
        .await
        .unwrap_or_else(|| Err(Error::General("No nodes available in query plan!".into())))
    }

    /// Stops background tasks and closes all connections. Further requests fail.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }

        for node in &self.nodes {
            node.close().await;
        }

        debug!(id = %self.id, "Cluster connection shut down.");
    }
}

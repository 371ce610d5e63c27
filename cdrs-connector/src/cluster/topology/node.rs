use atomic::Atomic;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::*;

use crate::cluster::connection_pool::{ConnectionPool, PooledConnection};
use crate::cluster::topology::NodeState;
use crate::cluster::NodeAddress;
use crate::protocol_error::{Error, Result};
use crate::transport::CdrsTransport;

/// Metadata about a Cassandra node in the cluster, along with its connection pool.
pub struct Node<T: CdrsTransport + 'static> {
    address: NodeAddress,
    datacenter: Option<String>,
    rack: Option<String>,
    state: Atomic<NodeState>,
    connection_pool: OnceCell<Arc<ConnectionPool<T>>>,
}

impl<T: CdrsTransport> Debug for Node<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("datacenter", &self.datacenter)
            .field("rack", &self.rack)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: CdrsTransport> Node<T> {
    pub(crate) fn new(
        address: NodeAddress,
        datacenter: Option<String>,
        rack: Option<String>,
    ) -> Self {
        Self::new_with_state(address, datacenter, rack, NodeState::Unknown)
    }

    pub(crate) fn new_with_state(
        address: NodeAddress,
        datacenter: Option<String>,
        rack: Option<String>,
        state: NodeState,
    ) -> Self {
        Node {
            address,
            datacenter,
            rack,
            state: Atomic::new(state),
            connection_pool: OnceCell::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// The address clients connect to.
    #[inline]
    pub fn broadcast_rpc_address(&self) -> SocketAddr {
        self.address.addr()
    }

    /// Returns the dc the node is in, if the node reported one.
    #[inline]
    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    /// Returns the rack the node is in, if the node reported one.
    #[inline]
    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    /// Checks if the node can be used in query plans.
    #[inline]
    pub fn is_up(&self) -> bool {
        self.state() == NodeState::Up
    }

    pub(crate) fn attach_pool(&self, pool: Arc<ConnectionPool<T>>) {
        if self.connection_pool.set(pool).is_err() {
            warn!(address = %self.address, "Connection pool already attached to node.");
        }
    }

    /// Returns a connection to given node.
    pub async fn persistent_connection(&self) -> Result<Arc<PooledConnection<T>>> {
        match self.connection_pool.get() {
            Some(pool) => pool.connection().await,
            None => Err(Error::General(format!(
                "No connection pool for: {}",
                self.address
            ))),
        }
    }

    /// Checks if any connection is still available.
    pub async fn is_any_connection_up(&self) -> bool {
        if let Some(pool) = self.connection_pool.get() {
            pool.is_any_connection_up().await
        } else {
            false
        }
    }

    /// Number of open connections, including broken ones awaiting reconnection.
    pub async fn connection_count(&self) -> usize {
        if let Some(pool) = self.connection_pool.get() {
            pool.len().await
        } else {
            0
        }
    }

    pub(crate) async fn close(&self) {
        self.force_down();
        if let Some(pool) = self.connection_pool.get() {
            pool.close().await;
        }
    }

    #[inline]
    pub(crate) fn mark_down(&self) {
        self.state.store(NodeState::Down, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn mark_up(&self) {
        self.state.store(NodeState::Up, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn force_down(&self) {
        self.state.store(NodeState::ForcedDown, Ordering::Relaxed);
    }
}

use atomic::Atomic;
use derive_more::Display;
use futures::future::join_all;
use std::ops::DerefMut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tokio::time::{interval_at, sleep, Instant};
use tracing::*;

use crate::cluster::topology::{Node, NodeDistance, NodeState};
use crate::cluster::{ConnectionManager, NodeAddress, PoolSize, PoolingOptions};
use crate::error::ConnectionError;
use crate::frame::{Envelope, Version};
use crate::protocol_error::{Error, Result as CdrsResult};
use crate::retry::{ReconnectionPolicy, ReconnectionSchedule};
use crate::transport::CdrsTransport;

#[derive(Copy, Clone, PartialEq, Eq, Display, bytemuck::NoUninit)]
#[repr(u8)]
enum ReconnectionState {
    NotRunning,
    InProgress,
    Disabled,
}

/// A pooled connection, which limits the number of concurrent requests.
pub struct PooledConnection<T: CdrsTransport> {
    transport: T,
    permits: Semaphore,
}

impl<T: CdrsTransport> PooledConnection<T> {
    fn new(transport: T, max_requests: usize) -> Self {
        PooledConnection {
            transport,
            permits: Semaphore::new(max_requests),
        }
    }

    /// Sends an envelope, waiting for a free request slot first.
    pub async fn write_envelope(&self, envelope: &Envelope) -> CdrsResult<Envelope> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|error| Error::General(error.to_string()))?;

        self.transport.write_envelope(envelope).await
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        self.transport.is_broken()
    }

    /// Number of requests which can still be sent without waiting.
    #[inline]
    pub fn available_requests(&self) -> usize {
        self.permits.available_permits()
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

pub(crate) struct ConnectionPoolFactory<T: CdrsTransport + 'static> {
    pooling_options: PoolingOptions,
    version: Version,
    connection_manager: Arc<dyn ConnectionManager<T>>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    shutdown: watch::Receiver<bool>,
}

impl<T: CdrsTransport + 'static> ConnectionPoolFactory<T> {
    pub(crate) fn new(
        pooling_options: PoolingOptions,
        version: Version,
        connection_manager: Arc<dyn ConnectionManager<T>>,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        ConnectionPoolFactory {
            pooling_options,
            version,
            connection_manager,
            reconnection_policy,
            shutdown,
        }
    }

    /// Opens the core connections of a new pool and starts its heartbeat and monitoring tasks.
    pub(crate) async fn create(
        &self,
        node_distance: NodeDistance,
        node: Weak<Node<T>>,
        address: NodeAddress,
    ) -> Result<Arc<ConnectionPool<T>>, ConnectionError> {
        let size = self.pooling_options.pool_size(node_distance);
        let (error_sender, error_receiver) = mpsc::channel(size.max_connections);

        let pool = Arc::new(
            ConnectionPool::new(&self.connection_manager, address, size, error_sender).await?,
        );

        Self::monitor_connections(
            error_receiver,
            Arc::downgrade(&pool),
            node,
            self.reconnection_policy.clone(),
            self.shutdown.clone(),
        );

        Self::send_heartbeats(
            Arc::downgrade(&pool),
            self.pooling_options,
            self.version,
            self.shutdown.clone(),
        );

        Ok(pool)
    }

    fn send_heartbeats(
        pool: Weak<ConnectionPool<T>>,
        pooling_options: PoolingOptions,
        version: Version,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = pooling_options.heartbeat_interval();
        tokio::spawn(async move {
            let options_envelope = Envelope::new_req_options(version);
            let mut interval = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }

                let Some(pool) = pool.upgrade() else {
                    break;
                };

                let connections = pool.live_connections().await;
                for connection in connections {
                    if let Err(error) = connection.write_envelope(&options_envelope).await {
                        warn!(address = %pool.address, %error, "Heartbeat failed.");
                        let _ = pool.error_sender.try_send(error);
                    }
                }
            }

            debug!("Heartbeat stopped.");
        });
    }

    fn monitor_connections(
        mut receiver: mpsc::Receiver<Error>,
        pool: Weak<ConnectionPool<T>>,
        node: Weak<Node<T>>,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tokio::spawn(async move {
            let reconnection_state = Arc::new(Atomic::new(ReconnectionState::NotRunning));
            loop {
                tokio::select! {
                    error = receiver.recv() => {
                        if error.is_none() {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }

                // when one connection goes down, all of them will most likely go down, so we need
                // to protect against many reconnection attempts
                let state = reconnection_state.load(Ordering::Relaxed);
                if state != ReconnectionState::NotRunning {
                    if state == ReconnectionState::Disabled {
                        break;
                    }

                    continue;
                }

                let Some(node) = node.upgrade() else {
                    warn!("Node not found when trying to reconnect!");
                    break;
                };

                let address = node.address().clone();
                if node.state() == NodeState::ForcedDown {
                    debug!(%address, "Not starting reconnection for a forced down node.");
                    break;
                }

                warn!(%address, "Connection down. Starting reconnection.");

                reconnection_state.store(ReconnectionState::InProgress, Ordering::Relaxed);
                node.mark_down();

                let reconnection_schedule = reconnection_policy.new_node_schedule();
                let reconnecting = reconnection_state.clone();
                let pool = pool.clone();
                let node = Arc::downgrade(&node);
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    let new_state =
                        Self::run_reconnection_loop(reconnection_schedule, pool, shutdown).await;

                    reconnecting.store(new_state, Ordering::Relaxed);
                    debug!(%address, %new_state, "Reconnection loop stopped.");

                    let Some(node) = node.upgrade() else {
                        return;
                    };

                    if new_state == ReconnectionState::Disabled {
                        warn!(
                            %address,
                            "Forcing node down, since no connection can be established."
                        );
                        node.force_down();
                    } else if node.state() != NodeState::ForcedDown {
                        debug!(%address, "All connections reestablished.");
                        node.mark_up();
                    }
                });
            }

            debug!("Pool monitoring stopped.");
        });
    }

    async fn run_reconnection_loop(
        mut reconnection_schedule: Box<dyn ReconnectionSchedule + Send + Sync>,
        pool: Weak<ConnectionPool<T>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReconnectionState {
        while let Some(delay) = reconnection_schedule.next_delay() {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => return ReconnectionState::Disabled,
            }

            let pool = match pool.upgrade() {
                None => return ReconnectionState::Disabled, // the pool might be gone
                Some(pool) => pool,
            };

            match pool.reconnect_broken().await {
                Ok(true) => return ReconnectionState::NotRunning,
                Ok(false) => return ReconnectionState::Disabled,
                // credentials will not get any better by retrying
                Err(error) if error.is_authentication() => {
                    error!(%error, "Reconnection rejected by node.");
                    return ReconnectionState::Disabled;
                }
                Err(error) => {
                    debug!(%error, "Reconnection attempt failed.");
                }
            }
        }

        // the policy doesn't want to reconnect to this node
        ReconnectionState::Disabled
    }
}

/// Connections to a single node. Opens the core number of connections up front and grows up to
/// the maximum when every live connection is saturated.
pub struct ConnectionPool<T: CdrsTransport> {
    connection_manager: Weak<dyn ConnectionManager<T>>,
    address: NodeAddress,
    size: PoolSize,
    pool: RwLock<Vec<Arc<PooledConnection<T>>>>,
    current_index: AtomicUsize,
    error_sender: mpsc::Sender<Error>,
    closed: AtomicBool,
}

impl<T: CdrsTransport + 'static> ConnectionPool<T> {
    async fn new(
        connection_manager: &Arc<dyn ConnectionManager<T>>,
        address: NodeAddress,
        size: PoolSize,
        error_sender: mpsc::Sender<Error>,
    ) -> Result<Self, ConnectionError> {
        let results = join_all((0..size.core_connections).map(|_| {
            connection_manager.connection(address.clone(), Some(error_sender.clone()))
        }))
        .await;

        let mut pool = Vec::with_capacity(size.core_connections);
        let mut first_error = None;

        for result in results {
            match result {
                Ok(transport) => pool.push(Arc::new(PooledConnection::new(
                    transport,
                    size.max_requests_per_connection,
                ))),
                // propagate unrecoverable error
                Err(error) if error.is_authentication() => return Err(error),
                Err(error) => {
                    debug!(%address, %error, "Failed to open pool connection.");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) if pool.is_empty() => return Err(error),
            Some(_) => {
                // some connections have failed, but can be brought back up, so trigger reconnection
                let _ = error_sender.try_send(Error::General(
                    "Not all pool connections could be established!".to_string(),
                ));
            }
            None => {}
        }

        Ok(ConnectionPool {
            connection_manager: Arc::downgrade(connection_manager),
            address,
            size,
            pool: RwLock::new(pool),
            current_index: AtomicUsize::new(0),
            error_sender,
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    #[inline]
    pub fn size(&self) -> PoolSize {
        self.size
    }

    /// Number of connections in the pool, including broken ones.
    pub async fn len(&self) -> usize {
        self.pool.read().await.len()
    }

    pub async fn is_any_connection_up(&self) -> bool {
        self.pool
            .read()
            .await
            .iter()
            .any(|connection| !connection.is_broken())
    }

    async fn live_connections(&self) -> Vec<Arc<PooledConnection<T>>> {
        self.pool
            .read()
            .await
            .iter()
            .filter(|connection| !connection.is_broken())
            .cloned()
            .collect()
    }

    /// Picks the next live connection with a free request slot. When all are saturated and the
    /// pool is below its maximum size, a new connection is opened.
    pub async fn connection(&self) -> CdrsResult<Arc<PooledConnection<T>>> {
        if self.is_closed() {
            return Err(Error::General(format!(
                "Connection pool closed: {}",
                self.address
            )));
        }

        let pool_len = {
            let pool = self.pool.read().await;
            if let Some(connection) = self.next_available(&pool) {
                return Ok(connection);
            }

            pool.len()
        };

        if pool_len < self.size.max_connections {
            match self.grow().await {
                Ok(Some(connection)) => return Ok(connection),
                Ok(None) => {}
                Err(error) => {
                    debug!(address = %self.address, %error, "Cannot grow connection pool.");
                }
            }
        }

        // everything is saturated - pick any live connection and wait for a free slot
        let pool = self.pool.read().await;
        let live = pool
            .iter()
            .filter(|connection| !connection.is_broken())
            .collect::<Vec<_>>();

        if live.is_empty() {
            // we've checked the whole pool and everything's down
            warn!(address = %self.address, "All connections down to node.");
            return Err(Error::General(format!(
                "No active connections to: {}",
                self.address
            )));
        }

        let index = self.current_index.fetch_add(1, Ordering::Relaxed) % live.len();
        Ok(live[index].clone())
    }

    fn next_available(
        &self,
        pool: &[Arc<PooledConnection<T>>],
    ) -> Option<Arc<PooledConnection<T>>> {
        if pool.is_empty() {
            return None;
        }

        let start = self.current_index.fetch_add(1, Ordering::Relaxed) % pool.len();
        (0..pool.len())
            .map(|offset| &pool[(start + offset) % pool.len()])
            .find(|connection| !connection.is_broken() && connection.available_requests() > 0)
            .cloned()
    }

    async fn grow(&self) -> Result<Option<Arc<PooledConnection<T>>>, ConnectionError> {
        if self.is_closed() {
            return Ok(None);
        }

        let Some(connection_manager) = self.connection_manager.upgrade() else {
            return Ok(None);
        };

        let transport = connection_manager
            .connection(self.address.clone(), Some(self.error_sender.clone()))
            .await?;

        let mut pool = self.pool.write().await;
        // closed or grown concurrently in the meantime
        if self.is_closed() || pool.len() >= self.size.max_connections {
            return Ok(None);
        }

        let connection = Arc::new(PooledConnection::new(
            transport,
            self.size.max_requests_per_connection,
        ));
        pool.push(connection.clone());

        debug!(address = %self.address, size = pool.len(), "Connection pool grown.");
        Ok(Some(connection))
    }

    /// Replaces broken connections and fills the pool back to its core size. Returns `false` when
    /// the pool is closed or being dropped.
    async fn reconnect_broken(&self) -> Result<bool, ConnectionError> {
        if self.is_closed() {
            return Ok(false);
        }

        let Some(connection_manager) = self.connection_manager.upgrade() else {
            // connection manager is gone - we're probably shutting down
            return Ok(false);
        };

        let mut pool = self.pool.write().await;
        if self.is_closed() {
            return Ok(false);
        }

        // 1. try to reconnect broken
        for connection in pool.deref_mut() {
            if connection.is_broken() {
                let transport = connection_manager
                    .connection(self.address.clone(), Some(self.error_sender.clone()))
                    .await?;

                *connection = Arc::new(PooledConnection::new(
                    transport,
                    self.size.max_requests_per_connection,
                ));
            }
        }

        // 2. try to fill missing
        for _ in pool.len()..self.size.core_connections {
            let transport = connection_manager
                .connection(self.address.clone(), Some(self.error_sender.clone()))
                .await?;

            pool.push(Arc::new(PooledConnection::new(
                transport,
                self.size.max_requests_per_connection,
            )));
        }

        // at this point either all connections are up or some might have died in the meantime,
        // which will trigger a new reconnection
        Ok(true)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Drops all connections, which stops their background tasks. A closed pool never opens new
    /// connections.
    pub(crate) async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.pool.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionPhase;
    use crate::frame::{Direction, Flags, Opcode};
    use crate::future::BoxFuture;
    use crate::retry::ConstantReconnectionPolicy;
    use crate::transport::MockCdrsTransport;
    use futures::FutureExt;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn address() -> NodeAddress {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9042).into()
    }

    fn healthy_transport() -> MockCdrsTransport {
        let mut transport = MockCdrsTransport::new();
        transport.expect_is_broken().return_const(false);
        transport.expect_write_envelope().returning(|_| {
            async {
                Ok(Envelope::new(
                    Version::V4,
                    Direction::Response,
                    Flags::empty(),
                    Opcode::Supported,
                    0,
                    vec![0, 0],
                ))
            }
            .boxed()
        });
        transport
    }

    /// Hands out healthy transports, or fails with the configured phase.
    struct FakeConnectionManager {
        opened: AtomicUsize,
        failure: Option<ConnectionPhase>,
        failing: AtomicBool,
    }

    impl FakeConnectionManager {
        fn new(failure: Option<ConnectionPhase>) -> Self {
            FakeConnectionManager {
                opened: AtomicUsize::new(0),
                failure,
                failing: AtomicBool::new(failure.is_some()),
            }
        }
    }

    impl ConnectionManager<MockCdrsTransport> for FakeConnectionManager {
        fn connection(
            &self,
            address: NodeAddress,
            _error_handler: Option<mpsc::Sender<Error>>,
        ) -> BoxFuture<Result<MockCdrsTransport, ConnectionError>> {
            let result = match self.failure {
                Some(phase) if self.failing.load(Ordering::Relaxed) => Err(ConnectionError::new(
                    address.host(),
                    phase,
                    Error::General("refused".into()),
                )),
                _ => {
                    self.opened.fetch_add(1, Ordering::Relaxed);
                    Ok(healthy_transport())
                }
            };

            async move { result }.boxed()
        }
    }

    fn pool_factory(
        manager: Arc<FakeConnectionManager>,
    ) -> (ConnectionPoolFactory<MockCdrsTransport>, watch::Sender<bool>) {
        let (shutdown_sender, shutdown) = watch::channel(false);
        let factory = ConnectionPoolFactory::new(
            PoolingOptions::new(
                PoolSize::new(2, 3, 1),
                PoolSize::new(1, 1, 1),
                Duration::from_secs(30),
            )
            .unwrap(),
            Version::V4,
            manager,
            Arc::new(ConstantReconnectionPolicy::new(Duration::from_millis(10))),
            shutdown,
        );

        (factory, shutdown_sender)
    }

    fn node() -> Arc<Node<MockCdrsTransport>> {
        Arc::new(Node::new(address(), None, None))
    }

    #[tokio::test]
    async fn should_open_core_connections() {
        let manager = Arc::new(FakeConnectionManager::new(None));
        let (factory, _shutdown) = pool_factory(manager.clone());
        let node = node();

        let pool = factory
            .create(NodeDistance::Local, Arc::downgrade(&node), address())
            .await
            .unwrap();

        assert_eq!(pool.len().await, 2);
        assert_eq!(manager.opened.load(Ordering::Relaxed), 2);
        assert!(pool.is_any_connection_up().await);
    }

    #[tokio::test]
    async fn should_grow_when_saturated() {
        let manager = Arc::new(FakeConnectionManager::new(None));
        let (factory, _shutdown) = pool_factory(manager.clone());
        let node = node();

        let pool = factory
            .create(NodeDistance::Local, Arc::downgrade(&node), address())
            .await
            .unwrap();

        // one request slot per connection - hold all of them
        let first = pool.connection().await.unwrap();
        let _first_permit = first.permits.acquire().await.unwrap();
        let second = pool.connection().await.unwrap();
        let _second_permit = second.permits.acquire().await.unwrap();

        let third = pool.connection().await.unwrap();
        assert_eq!(third.available_requests(), 1);
        assert_eq!(pool.len().await, 3);

        // at maximum size, saturated connections are handed out anyway
        let _third_permit = third.permits.acquire().await.unwrap();
        pool.connection().await.unwrap();
        assert_eq!(pool.len().await, 3);
    }

    #[tokio::test]
    async fn should_fail_when_no_connection_opens() {
        let manager = Arc::new(FakeConnectionManager::new(Some(ConnectionPhase::Connect)));
        let (factory, _shutdown) = pool_factory(manager);
        let node = node();

        let error = factory
            .create(NodeDistance::Local, Arc::downgrade(&node), address())
            .await
            .err()
            .unwrap();

        assert_eq!(error.phase, ConnectionPhase::Connect);
    }

    #[tokio::test]
    async fn should_propagate_authentication_failure() {
        let manager = Arc::new(FakeConnectionManager::new(Some(
            ConnectionPhase::Authentication,
        )));
        let (factory, _shutdown) = pool_factory(manager);
        let node = node();

        let error = factory
            .create(NodeDistance::Remote, Arc::downgrade(&node), address())
            .await
            .err()
            .unwrap();

        assert!(error.is_authentication());
    }

    #[tokio::test]
    async fn should_close_connections() {
        let manager = Arc::new(FakeConnectionManager::new(None));
        let (factory, shutdown) = pool_factory(manager.clone());
        let node = node();

        let pool = factory
            .create(NodeDistance::Remote, Arc::downgrade(&node), address())
            .await
            .unwrap();

        let _ = shutdown.send(true);
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(pool.len().await, 0);
        assert!(pool.connection().await.is_err());
        assert!(!pool.reconnect_broken().await.unwrap());
        assert!(pool.grow().await.unwrap().is_none());
        assert_eq!(pool.len().await, 0);
        assert_eq!(manager.opened.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn should_reconnect_after_failure() {
        let manager = Arc::new(FakeConnectionManager::new(None));
        let (factory, _shutdown) = pool_factory(manager);
        let node = node();

        let pool = factory
            .create(NodeDistance::Local, Arc::downgrade(&node), address())
            .await
            .unwrap();

        pool.error_sender
            .send(Error::General("connection reset".into()))
            .await
            .unwrap();

        // only a finished reconnection loop marks the node up
        for _ in 0..200 {
            if node.is_up() {
                break;
            }

            sleep(Duration::from_millis(10)).await;
        }

        assert!(node.is_up());
        assert_eq!(pool.len().await, 2);
    }
}

//! Load balancing policies decide which nodes handle a request, and in which order they are tried.
use arc_swap::ArcSwapOption;
use derive_more::Constructor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::*;

use crate::cluster::topology::{Node, NodeDistance};
use crate::transport::CdrsTransport;

/// Ordered list of nodes to try for a single request.
#[derive(Debug, Constructor)]
pub struct QueryPlan<T: CdrsTransport + 'static> {
    pub nodes: Vec<Arc<Node<T>>>,
}

impl<T: CdrsTransport> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        QueryPlan::new(self.nodes.clone())
    }
}

impl<T: CdrsTransport> Default for QueryPlan<T> {
    fn default() -> Self {
        QueryPlan::new(vec![])
    }
}

/// Load balancing policy, used for choosing request targets and sizing node connection pools.
pub trait LoadBalancingPolicy<T: CdrsTransport>: Send + Sync {
    /// Called once with all known nodes, before any pool is opened.
    fn init(&self, nodes: &[Arc<Node<T>>]);

    /// Returns the distance to given node.
    fn distance(&self, node: &Node<T>) -> NodeDistance;

    /// Returns query plan for a new request.
    fn query_plan(&self, nodes: &[Arc<Node<T>>]) -> QueryPlan<T>;
}

/// Round-robin load balancing, which prefers nodes in the local datacenter. Remote nodes are only
/// used when no local node is up. Nodes which did not report their datacenter are considered
/// local.
///
/// When no local datacenter is given, the datacenter of the first node which reports one is
/// adopted during initialization.
#[derive(Debug, Default)]
pub struct DcAwareRoundRobinPolicy {
    local_dc: ArcSwapOption<String>,
    prev_idx: AtomicUsize,
}

impl DcAwareRoundRobinPolicy {
    pub fn new(local_dc: Option<String>) -> Self {
        DcAwareRoundRobinPolicy {
            local_dc: ArcSwapOption::new(local_dc.map(Arc::new)),
            prev_idx: AtomicUsize::new(0),
        }
    }

    /// Returns the preferred datacenter, if known.
    pub fn local_dc(&self) -> Option<String> {
        self.local_dc.load().as_deref().cloned()
    }

    fn is_local(&self, datacenter: Option<&str>) -> bool {
        match (self.local_dc.load().as_deref(), datacenter) {
            (Some(local_dc), Some(datacenter)) => local_dc == datacenter,
            _ => true,
        }
    }

    fn round_robin<T: CdrsTransport>(&self, nodes: Vec<Arc<Node<T>>>) -> QueryPlan<T> {
        if nodes.is_empty() {
            return QueryPlan::default();
        }

        let start = self.prev_idx.fetch_add(1, Ordering::Relaxed) % nodes.len();
        QueryPlan::new(
            nodes
                .iter()
                .cycle()
                .skip(start)
                .take(nodes.len())
                .cloned()
                .collect(),
        )
    }
}

impl<T: CdrsTransport> LoadBalancingPolicy<T> for DcAwareRoundRobinPolicy {
    fn init(&self, nodes: &[Arc<Node<T>>]) {
        if let Some(local_dc) = self.local_dc.load_full() {
            if !nodes
                .iter()
                .any(|node| node.datacenter() == Some(local_dc.as_str()))
            {
                warn!(%local_dc, "No contact host reported the local datacenter.");
            }

            return;
        }

        if let Some(datacenter) = nodes.iter().find_map(|node| node.datacenter()) {
            debug!(%datacenter, "Using datacenter of first contact host as local.");
            self.local_dc.store(Some(Arc::new(datacenter.to_string())));
        }
    }

    fn distance(&self, node: &Node<T>) -> NodeDistance {
        if self.is_local(node.datacenter()) {
            NodeDistance::Local
        } else {
            NodeDistance::Remote
        }
    }

    fn query_plan(&self, nodes: &[Arc<Node<T>>]) -> QueryPlan<T> {
        let (local, remote): (Vec<_>, Vec<_>) = nodes
            .iter()
            .filter(|node| node.is_up())
            .cloned()
            .partition(|node| self.is_local(node.datacenter()));

        if local.is_empty() {
            self.round_robin(remote)
        } else {
            self.round_robin(local)
        }
    }
}

use derive_more::Display;

/// Determines how the driver will manage connections to a Cassandra node.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display)]
pub enum NodeDistance {
    /// A node in the local datacenter. Local nodes are preferred in query plans and get the
    /// larger per-connection request limit.
    Local,
    /// A node in any other datacenter. Remote nodes are only used when no local node is up.
    Remote,
}

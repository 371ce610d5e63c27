use bytemuck::NoUninit;
use derive_more::Display;

/// The state of a node, as viewed from the driver.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, NoUninit)]
#[repr(u8)]
pub enum NodeState {
    /// The node has been discovered, but its connection pool is not open yet.
    Unknown,
    /// The driver has at least one active connection to the node.
    Up,
    /// The driver has lost connections to the node and is trying to reconnect.
    Down,
    /// The node was deliberately taken out of rotation: either the cluster is shutting down, or
    /// the reconnection policy gave up on it.
    ForcedDown,
}

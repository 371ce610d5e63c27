mod node;
mod node_distance;
mod node_state;

pub use self::node::Node;
pub use self::node_distance::NodeDistance;
pub use self::node_state::NodeState;

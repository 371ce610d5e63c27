use itertools::Itertools;
use std::fmt;
use std::net::SocketAddr;
use tokio::net::lookup_host;

use crate::error::{ConnectionError, ConnectionPhase};

/// Address of a single node: the configured host it was resolved from, together with the socket
/// address. The host is kept, since it names the server during a TLS handshake.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    host: String,
    addr: SocketAddr,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, addr: SocketAddr) -> Self {
        NodeAddress {
            host: host.into(),
            addr,
        }
    }

    /// Resolves a contact host into node addresses. A name may resolve into multiple addresses,
    /// each becoming a separate node.
    pub async fn resolve(host: &str, port: u16) -> Result<Vec<NodeAddress>, ConnectionError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|error| ConnectionError::new(host, ConnectionPhase::Resolve, error.into()))?
            .unique()
            .map(|addr| NodeAddress::new(host, addr))
            .collect_vec();

        if addrs.is_empty() {
            return Err(ConnectionError::new(
                host,
                ConnectionPhase::Resolve,
                format!("No addresses found for {host}").into(),
            ));
        }

        Ok(addrs)
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        NodeAddress::new(addr.ip().to_string(), addr)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host == self.addr.ip().to_string() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.host, self.addr)
        }
    }
}

use futures::FutureExt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

use crate::authenticators::SaslAuthenticatorProvider;
use crate::cluster::connection_manager::{connect_tcp, startup, ConnectionManager};
use crate::cluster::{NodeAddress, SocketOptions};
use crate::compression::Compression;
use crate::error::ConnectionError;
use crate::frame::Version;
use crate::future::BoxFuture;
use crate::protocol_error::Error;
use crate::transport::Transport;

/// Opens plaintext connections.
pub struct TcpConnectionManager {
    authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    socket_options: SocketOptions,
    compression: Compression,
    buffer_size: usize,
    version: Version,
}

impl ConnectionManager<Transport> for TcpConnectionManager {
    fn connection(
        &self,
        address: NodeAddress,
        error_handler: Option<Sender<Error>>,
    ) -> BoxFuture<Result<Transport, ConnectionError>> {
        self.establish_connection(address, error_handler).boxed()
    }
}

impl TcpConnectionManager {
    pub fn new(
        authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
        socket_options: SocketOptions,
        compression: Compression,
        buffer_size: usize,
        version: Version,
    ) -> Self {
        TcpConnectionManager {
            authenticator_provider,
            socket_options,
            compression,
            buffer_size,
            version,
        }
    }

    async fn establish_connection(
        &self,
        address: NodeAddress,
        error_handler: Option<Sender<Error>>,
    ) -> Result<Transport, ConnectionError> {
        let stream = connect_tcp(
            &address,
            self.socket_options.connect_timeout(),
            self.socket_options.tcp_nodelay(),
        )
        .await?;

        let transport = Transport::with_stream(
            stream,
            address.addr(),
            self.compression,
            self.socket_options.read_timeout(),
            self.buffer_size,
            error_handler,
        );

        startup(
            &transport,
            address.host(),
            self.authenticator_provider.deref(),
            self.compression,
            self.version,
        )
        .await?;

        Ok(transport)
    }
}

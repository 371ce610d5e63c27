use futures::FutureExt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;

use crate::authenticators::SaslAuthenticatorProvider;
use crate::cluster::connection_manager::{connect_tcp, startup, ConnectionManager};
use crate::cluster::{NodeAddress, SocketOptions};
use crate::compression::Compression;
use crate::error::{ConnectionError, ConnectionPhase};
use crate::frame::Version;
use crate::future::BoxFuture;
use crate::protocol_error::Error;
use crate::transport::Transport;

/// Opens TLS encrypted connections. The server certificate is verified against the name of the
/// contact host the node address was resolved from.
pub struct RustlsConnectionManager {
    authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    config: Arc<ClientConfig>,
    socket_options: SocketOptions,
    compression: Compression,
    buffer_size: usize,
    version: Version,
}

impl ConnectionManager<Transport> for RustlsConnectionManager {
    fn connection(
        &self,
        address: NodeAddress,
        error_handler: Option<Sender<Error>>,
    ) -> BoxFuture<Result<Transport, ConnectionError>> {
        self.establish_connection(address, error_handler).boxed()
    }
}

impl RustlsConnectionManager {
    pub fn new(
        authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
        config: Arc<ClientConfig>,
        socket_options: SocketOptions,
        compression: Compression,
        buffer_size: usize,
        version: Version,
    ) -> Self {
        RustlsConnectionManager {
            authenticator_provider,
            config,
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
        let handshake_error = |error: Error| {
            ConnectionError::new(address.host(), ConnectionPhase::TlsHandshake, error)
        };

        let server_name = ServerName::try_from(address.host().to_string())
            .map_err(|error| handshake_error(Error::General(error.to_string())))?;

        let stream = connect_tcp(
            &address,
            self.socket_options.connect_timeout(),
            self.socket_options.tcp_nodelay(),
        )
        .await?;

        let transport = tokio::time::timeout(
            self.socket_options.connect_timeout(),
            Transport::with_tls_stream(
                stream,
                address.addr(),
                server_name,
                self.config.clone(),
                self.compression,
                self.socket_options.read_timeout(),
                self.buffer_size,
                error_handler,
            ),
        )
        .await
        .map_err(|_| {
            handshake_error(Error::Timeout(format!(
                "Timeout waiting for TLS handshake with: {address}"
            )))
        })?
        .map_err(|error| handshake_error(error.into()))?;

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

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdrs_connector::authenticators::PASSWORD_AUTHENTICATOR;
use cdrs_connector::compression::Compression;
use cdrs_connector::frame::message_auth::{BodyAuthToken, BodyResAuthenticate};
use cdrs_connector::frame::message_error::{ErrorBody, ErrorCode};
use cdrs_connector::frame::message_result::{
    BodyResResultRows, ColType, ColumnSpec, ResResultBody,
};
use cdrs_connector::frame::{
    Direction, Envelope, EnvelopeHeader, Flags, FromCursor, Opcode, Serialize, Version,
    HEADER_LEN,
};
use cdrs_connector::types::CBytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::EnvFilter;

pub const DATACENTER: &str = "dc1";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn resource(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("resources")
        .join(name)
}

/// Returns a local port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Polls given condition until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    condition()
}

#[derive(Debug, Default)]
pub struct NodeStats {
    pub accepted: AtomicUsize,
    pub tls_failures: AtomicUsize,
    pub queries: AtomicUsize,
}

impl NodeStats {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn tls_failures(&self) -> usize {
        self.tls_failures.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// In-process node speaking just enough of the native protocol to get a connection ready:
/// STARTUP, password authentication, OPTIONS and the `system.local` location query.
#[derive(Debug, Clone)]
pub struct FakeNodeBuilder {
    datacenter: String,
    credentials: Option<(String, String)>,
    tls: bool,
}

impl Default for FakeNodeBuilder {
    fn default() -> Self {
        FakeNodeBuilder {
            datacenter: DATACENTER.into(),
            credentials: None,
            tls: false,
        }
    }
}

impl FakeNodeBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = datacenter.into();
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Accepts only TLS connections, presenting a certificate for 127.0.0.1 signed by the test
    /// CA.
    pub fn with_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    pub async fn start(self) -> FakeNode {
        init_logging();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(NodeStats::default());
        let acceptor = self
            .tls
            .then(|| TlsAcceptor::from(Arc::new(server_config())));
        let behavior = Arc::new(self);

        tokio::spawn({
            let stats = stats.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    stats.accepted.fetch_add(1, Ordering::SeqCst);

                    let behavior = behavior.clone();
                    let stats = stats.clone();
                    let acceptor = acceptor.clone();

                    tokio::spawn(async move {
                        match acceptor {
                            Some(acceptor) => match acceptor.accept(socket).await {
                                Ok(stream) => behavior.serve(stream, &stats).await,
                                Err(_) => {
                                    stats.tls_failures.fetch_add(1, Ordering::SeqCst);
                                }
                            },
                            None => behavior.serve(socket, &stats).await,
                        }
                    });
                }
            }
        });

        FakeNode { addr, stats }
    }

    async fn serve<S: AsyncRead + AsyncWrite + Unpin>(&self, mut stream: S, stats: &NodeStats) {
        loop {
            let mut header = [0; HEADER_LEN];
            if stream.read_exact(&mut header).await.is_err() {
                return;
            }

            let Ok(header) = EnvelopeHeader::parse(&header) else {
                return;
            };

            let mut body = vec![0; header.body_len];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }

            let Ok(request) = Envelope::from_parts(header, body, Compression::None) else {
                return;
            };

            let Ok(data) = self.respond(&request, stats).encode_with(Compression::None) else {
                return;
            };

            if stream.write_all(&data).await.is_err() || stream.flush().await.is_err() {
                return;
            }
        }
    }

    fn respond(&self, request: &Envelope, stats: &NodeStats) -> Envelope {
        let (opcode, body) = match request.opcode {
            Opcode::Startup => match self.credentials {
                Some(_) => (
                    Opcode::Authenticate,
                    BodyResAuthenticate {
                        data: PASSWORD_AUTHENTICATOR.into(),
                    }
                    .serialize_to_vec(),
                ),
                None => (Opcode::Ready, vec![]),
            },
            Opcode::AuthResponse if self.accepts(&request.body) => (
                Opcode::AuthSuccess,
                BodyAuthToken {
                    data: CBytes::new_null(),
                }
                .serialize_to_vec(),
            ),
            Opcode::AuthResponse => (
                Opcode::Error,
                ErrorBody::new(
                    ErrorCode::Authentication,
                    "Provided username and/or password are incorrect",
                )
                .serialize_to_vec(),
            ),
            Opcode::Options => (Opcode::Supported, vec![0, 0]),
            Opcode::Query => {
                stats.queries.fetch_add(1, Ordering::SeqCst);
                (Opcode::Result, self.local_rows())
            }
            _ => (
                Opcode::Error,
                ErrorBody::new(ErrorCode::Protocol, "Unsupported request").serialize_to_vec(),
            ),
        };

        Envelope::new(
            Version::V4,
            Direction::Response,
            Flags::empty(),
            opcode,
            request.stream_id,
            body,
        )
    }

    fn accepts(&self, body: &[u8]) -> bool {
        let Some((username, password)) = &self.credentials else {
            return false;
        };

        let Ok(token) = BodyAuthToken::from_cursor(&mut Cursor::new(body)) else {
            return false;
        };

        let expected = format!("\0{username}\0{password}");
        token.data.as_slice() == Some(expected.as_bytes())
    }

    fn local_rows(&self) -> Vec<u8> {
        ResResultBody::Rows(BodyResResultRows {
            keyspace: "system".into(),
            table: "local".into(),
            columns: vec![
                ColumnSpec {
                    name: "data_center".into(),
                    col_type: ColType::Varchar,
                },
                ColumnSpec {
                    name: "rack".into(),
                    col_type: ColType::Varchar,
                },
            ],
            rows: vec![vec![
                CBytes::new(self.datacenter.as_bytes().to_vec()),
                CBytes::new(b"rack1".to_vec()),
            ]],
        })
        .serialize_to_vec()
    }
}

pub struct FakeNode {
    addr: SocketAddr,
    stats: Arc<NodeStats>,
}

impl FakeNode {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }
}

fn server_config() -> ServerConfig {
    let certs = rustls_pemfile::certs(&mut &include_bytes!("../resources/server.pem")[..])
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut &include_bytes!("../resources/server.key")[..])
        .unwrap()
        .unwrap();

    ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap()
}

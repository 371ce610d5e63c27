//! This module contains a declaration of the `CdrsTransport` trait, which abstracts a single
//! multiplexed connection to a node, and [`Transport`], its implementation on top of plain TCP
//! or TLS streams.
//!
//! Requests are tagged with a stream id and written by a background task; responses are routed
//! back to waiting requests by the same id, so many requests can be in flight at once.
use derive_more::Constructor;
use futures::FutureExt;
use fxhash::FxHashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{
    split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::*;

#[cfg(test)]
use mockall::*;

use crate::compression::Compression;
use crate::frame::message_response::ResponseBody;
use crate::frame::{Envelope, EnvelopeHeader, Opcode, StreamId, HEADER_LEN};
use crate::future::BoxFuture;
use crate::protocol_error::{Error, Result};

/// General CDRS transport trait.
pub trait CdrsTransport: Send + Sync {
    /// Schedules an envelope for writing and waits for a response. `ERROR` responses are turned
    /// into [`Error::Server`].
    fn write_envelope<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Result<Envelope>>;

    /// Checks if the connection is broken (e.g. after read or write errors)
    fn is_broken(&self) -> bool;

    /// Returns associated node address
    fn address(&self) -> SocketAddr;
}

#[cfg(test)]
mock! {
    pub CdrsTransport {
    }

    impl CdrsTransport for CdrsTransport {
        fn write_envelope(&self, envelope: &Envelope) -> BoxFuture<'static, Result<Envelope>>;

        fn is_broken(&self) -> bool;

        fn address(&self) -> SocketAddr;
    }
}

/// Default transport, over a plain or TLS encrypted TCP stream.
pub struct Transport {
    inner: AsyncTransport,
}

impl Transport {
    /// Wraps an established TCP stream.
    pub fn with_stream(
        stream: TcpStream,
        addr: SocketAddr,
        compression: Compression,
        read_timeout: Option<Duration>,
        buffer_size: usize,
        error_handler: Option<mpsc::Sender<Error>>,
    ) -> Self {
        let (read_half, write_half) = split(stream);
        Transport {
            inner: AsyncTransport::new(
                addr,
                compression,
                read_timeout,
                buffer_size,
                read_half,
                write_half,
                error_handler,
            ),
        }
    }

    /// Performs a TLS handshake on an established TCP stream and wraps the encrypted stream.
    #[allow(clippy::too_many_arguments)]
    pub async fn with_tls_stream(
        stream: TcpStream,
        addr: SocketAddr,
        server_name: ServerName<'static>,
        config: Arc<ClientConfig>,
        compression: Compression,
        read_timeout: Option<Duration>,
        buffer_size: usize,
        error_handler: Option<mpsc::Sender<Error>>,
    ) -> io::Result<Self> {
        let connector = TlsConnector::from(config);
        let stream = connector.connect(server_name, stream).await?;
        let (read_half, write_half) = split(stream);

        Ok(Transport {
            inner: AsyncTransport::new(
                addr,
                compression,
                read_timeout,
                buffer_size,
                read_half,
                write_half,
                error_handler,
            ),
        })
    }
}

impl CdrsTransport for Transport {
    #[inline]
    fn write_envelope<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Result<Envelope>> {
        self.inner.write_envelope(envelope).boxed()
    }

    #[inline]
    fn is_broken(&self) -> bool {
        self.inner.is_broken()
    }

    #[inline]
    fn address(&self) -> SocketAddr {
        self.inner.addr()
    }
}

struct AsyncTransport {
    addr: SocketAddr,
    compression: Compression,
    read_timeout: Option<Duration>,
    write_sender: mpsc::Sender<Request>,
    next_stream_id: AtomicUsize,
    is_broken: Arc<AtomicBool>,
    processing_handle: JoinHandle<()>,
}

impl Drop for AsyncTransport {
    fn drop(&mut self) {
        self.processing_handle.abort();
    }
}

impl AsyncTransport {
    fn new<T: AsyncRead + AsyncWrite + Send + 'static>(
        addr: SocketAddr,
        compression: Compression,
        read_timeout: Option<Duration>,
        buffer_size: usize,
        read_half: ReadHalf<T>,
        write_half: WriteHalf<T>,
        error_handler: Option<mpsc::Sender<Error>>,
    ) -> Self {
        let (write_sender, write_receiver) = mpsc::channel(buffer_size);
        let is_broken = Arc::new(AtomicBool::new(false));

        let processing_handle = tokio::spawn(Self::start_processing(
            addr,
            write_receiver,
            error_handler,
            read_half,
            write_half,
            is_broken.clone(),
            compression,
        ));

        AsyncTransport {
            addr,
            compression,
            read_timeout,
            write_sender,
            next_stream_id: AtomicUsize::new(0),
            is_broken,
            processing_handle,
        }
    }

    #[inline]
    fn is_broken(&self) -> bool {
        self.is_broken.load(Ordering::Relaxed)
    }

    #[inline]
    fn addr(&self) -> SocketAddr {
        self.addr
    }

    // negative ids are reserved for server events
    #[inline]
    fn next_stream_id(&self) -> StreamId {
        (self.next_stream_id.fetch_add(1, Ordering::Relaxed) % (StreamId::MAX as usize + 1))
            as StreamId
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<Envelope> {
        let (sender, receiver) = oneshot::channel();
        let stream_id = self.next_stream_id();

        let data = envelope
            .clone()
            .with_stream_id(stream_id)
            .encode_with(self.compression)?;

        self.write_sender
            .send(Request::new(data, stream_id, sender))
            .await
            .map_err(|_| Error::General("Connection closed when writing data!".into()))?;

        let response = match self.read_timeout {
            Some(read_timeout) => tokio::time::timeout(read_timeout, receiver)
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "No response from {} within {read_timeout:?}",
                        self.addr
                    ))
                })?,
            None => receiver.await,
        };

        let response = response
            .map_err(|_| Error::General("Connection closed while waiting for response!".into()))??;

        if response.opcode == Opcode::Error {
            if let ResponseBody::Error(body) = response.response_body()? {
                return Err(Error::Server {
                    body,
                    addr: self.addr,
                });
            }
        }

        Ok(response)
    }

    async fn start_processing<T: AsyncRead + AsyncWrite>(
        addr: SocketAddr,
        write_receiver: mpsc::Receiver<Request>,
        error_handler: Option<mpsc::Sender<Error>>,
        read_half: ReadHalf<T>,
        write_half: WriteHalf<T>,
        is_broken: Arc<AtomicBool>,
        compression: Compression,
    ) {
        let response_handler_map = ResponseHandlerMap::new();

        let writer = Self::start_writing(
            write_receiver,
            BufWriter::new(write_half),
            &response_handler_map,
        );

        let reader = Self::start_reading(read_half, compression, &response_handler_map);

        let result = tokio::try_join!(writer, reader);
        if let Err(error) = result {
            error!(%error, %addr, "Transport error!");

            is_broken.store(true, Ordering::Relaxed);
            response_handler_map.signal_general_error(&error.to_string());

            if let Some(error_handler) = error_handler {
                let _ = error_handler.send(error).await;
            }
        }
    }

    async fn start_reading<T: AsyncRead>(
        mut read_half: ReadHalf<T>,
        compression: Compression,
        response_handler_map: &ResponseHandlerMap,
    ) -> Result<()> {
        loop {
            let envelope = read_envelope(&mut read_half, compression).await?;
            if envelope.stream_id >= 0 {
                response_handler_map.send_response(envelope.stream_id, Ok(envelope));
            } else {
                // events are never registered for, so anything pushed by the server is dropped
                trace!(opcode = %envelope.opcode, "Ignoring server event.");
            }
        }
    }

    async fn start_writing(
        mut write_receiver: mpsc::Receiver<Request>,
        mut write_half: impl AsyncWrite + Unpin,
        response_handler_map: &ResponseHandlerMap,
    ) -> Result<()> {
        while let Some(mut request) = write_receiver.recv().await {
            loop {
                response_handler_map.add_handler(request.stream_id, request.handler);

                if let Err(error) = write_half.write_all(&request.data).await {
                    response_handler_map.send_response(request.stream_id, Err(error.into()));
                    return Err(Error::General("Write channel failure!".into()));
                }

                request = match write_receiver.try_recv() {
                    Ok(request) => request,
                    Err(_) => break,
                }
            }

            if let Err(error) = write_half.flush().await {
                response_handler_map.send_response(request.stream_id, Err(error.into()));
                return Err(Error::General("Write channel failure!".into()));
            }
        }

        Ok(())
    }
}

/// Reads a single envelope: the fixed size header, followed by the body it announces.
pub(crate) async fn read_envelope<T: AsyncRead + Unpin>(
    reader: &mut T,
    compression: Compression,
) -> Result<Envelope> {
    let mut header = [0; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let header = EnvelopeHeader::parse(&header)?;

    let mut body = vec![0; header.body_len];
    reader.read_exact(&mut body).await?;

    Envelope::from_parts(header, body, compression)
}

type ResponseHandler = oneshot::Sender<Result<Envelope>>;

#[derive(Default)]
struct ResponseHandlerMap {
    stream_handlers: Mutex<FxHashMap<StreamId, ResponseHandler>>,
}

impl ResponseHandlerMap {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline]
    fn handlers(&self) -> MutexGuard<'_, FxHashMap<StreamId, ResponseHandler>> {
        self.stream_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn add_handler(&self, stream_id: StreamId, handler: ResponseHandler) {
        self.handlers().insert(stream_id, handler);
    }

    pub fn send_response(&self, stream_id: StreamId, response: Result<Envelope>) {
        match self.handlers().remove(&stream_id) {
            Some(handler) => {
                let _ = handler.send(response);
            }
            // the request might have timed out in the meantime
            None => debug!(stream_id, "Dropping response for unknown stream."),
        }
    }

    pub fn signal_general_error(&self, error: &str) {
        for (_, handler) in self.handlers().drain() {
            let _ = handler.send(Err(Error::General(error.to_string())));
        }
    }
}

#[derive(Constructor)]
struct Request {
    data: Vec<u8>,
    stream_id: StreamId,
    handler: ResponseHandler,
}

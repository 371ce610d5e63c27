use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::Sender;

use crate::authenticators::SaslAuthenticatorProvider;
use crate::cluster::NodeAddress;
use crate::compression::Compression;
use crate::error::{ConnectionError, ConnectionPhase};
use crate::frame::message_error::ErrorCode;
use crate::frame::message_response::ResponseBody;
use crate::frame::{Envelope, Opcode, Version};
use crate::future::BoxFuture;
use crate::protocol_error::Error;
use crate::transport::CdrsTransport;

/// Manages establishing connections to nodes.
pub trait ConnectionManager<T: CdrsTransport>: Send + Sync {
    /// Tries to establish a new, ready to use connection with an optional error handler, which
    /// gets notified when the connection breaks.
    fn connection(
        &self,
        address: NodeAddress,
        error_handler: Option<Sender<Error>>,
    ) -> BoxFuture<Result<T, ConnectionError>>;
}

/// Opens a TCP connection within the connect timeout.
pub(crate) async fn connect_tcp(
    address: &NodeAddress,
    connect_timeout: Duration,
    tcp_nodelay: bool,
) -> Result<TcpStream, ConnectionError> {
    let connect_error =
        |error: Error| ConnectionError::new(address.host(), ConnectionPhase::Connect, error);

    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address.addr()))
        .await
        .map_err(|_| {
            connect_error(Error::Timeout(format!(
                "Timeout waiting for connection to: {address}"
            )))
        })?
        .map_err(|error| connect_error(error.into()))?;

    stream
        .set_nodelay(tcp_nodelay)
        .map_err(|error| connect_error(error.into()))?;

    Ok(stream)
}

fn is_credentials_rejection(error: &Error) -> bool {
    matches!(error, Error::Server { body, .. } if body.error_code == ErrorCode::Authentication)
}

/// Establishes Cassandra connection with given authentication and compression. Only credentials
/// rejected by the node and authenticator failures are reported as authentication failures;
/// transport errors and timeouts during the exchange are startup failures.
pub async fn startup<T, A>(
    transport: &T,
    host: &str,
    authenticator_provider: &A,
    compression: Compression,
    version: Version,
) -> Result<(), ConnectionError>
where
    T: CdrsTransport + ?Sized,
    A: SaslAuthenticatorProvider + Send + Sync + ?Sized,
{
    let startup_error = |error: Error| ConnectionError::new(host, ConnectionPhase::Startup, error);
    let auth_error =
        |error: Error| ConnectionError::new(host, ConnectionPhase::Authentication, error);
    let exchange_error = |error: Error| {
        if is_credentials_rejection(&error) {
            auth_error(error)
        } else {
            startup_error(error)
        }
    };

    let startup_envelope = Envelope::new_req_startup(compression.as_str(), version);
    let start_response = transport
        .write_envelope(&startup_envelope)
        .await
        // a node rejecting credentials before asking for them still means bad credentials
        .map_err(exchange_error)?;

    match start_response.opcode {
        Opcode::Ready => return Ok(()),
        Opcode::Authenticate => {}
        opcode => return Err(startup_error(Error::UnexpectedStartupResponse(opcode))),
    }

    let body = start_response.response_body().map_err(startup_error)?;
    let authenticator = body.authenticator().ok_or_else(|| {
        auth_error(Error::General(
            "Cassandra server did communicate that it needed authentication but the auth schema was missing in the body response".into(),
        ))
    })?;

    match authenticator_provider.name() {
        None => {
            return Err(auth_error(Error::General(format!(
                "Server requires {authenticator} authentication, but no credentials were provided"
            ))))
        }
        Some(auth) if auth != authenticator => {
            return Err(auth_error(Error::General(format!(
                "Unsupported type of authenticator. {authenticator:?} got, but {auth} is supported."
            ))))
        }
        Some(_) => {}
    }

    let authenticator = authenticator_provider.create_authenticator();
    let response = authenticator.initial_response();
    let mut envelope = transport
        .write_envelope(&Envelope::new_req_auth_response(response, version))
        .await
        .map_err(exchange_error)?;

    loop {
        match envelope.response_body().map_err(startup_error)? {
            ResponseBody::AuthChallenge(challenge) => {
                let response = authenticator
                    .evaluate_challenge(challenge.data)
                    .map_err(auth_error)?;

                envelope = transport
                    .write_envelope(&Envelope::new_req_auth_response(response, version))
                    .await
                    .map_err(exchange_error)?;
            }
            ResponseBody::AuthSuccess(success) => {
                return authenticator
                    .handle_success(success.data)
                    .map_err(auth_error);
            }
            _ => return Err(startup_error(Error::UnexpectedAuthResponse(envelope.opcode))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticators::{NoneAuthenticatorProvider, StaticPasswordAuthenticatorProvider};
    use crate::frame::message_auth::{BodyAuthToken, BodyResAuthenticate};
    use crate::frame::message_error::ErrorBody;
    use crate::frame::{Direction, Flags, Serialize};
    use crate::transport::MockCdrsTransport;
    use crate::types::CBytes;
    use futures::FutureExt;
    use mockall::Sequence;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    const AUTHENTICATOR: &str = "org.apache.cassandra.auth.PasswordAuthenticator";

    fn response(opcode: Opcode, body: Vec<u8>) -> Envelope {
        Envelope::new(
            Version::V4,
            Direction::Response,
            Flags::empty(),
            opcode,
            0,
            body,
        )
    }

    fn expect_response(
        transport: &mut MockCdrsTransport,
        sequence: &mut Sequence,
        request: Opcode,
        result: Result<Envelope, Error>,
    ) {
        let mut result = Some(result);
        transport
            .expect_write_envelope()
            .withf(move |envelope| envelope.opcode == request)
            .times(1)
            .in_sequence(sequence)
            .returning(move |_| {
                let result = result
                    .take()
                    .unwrap_or_else(|| Err(Error::General("called twice".into())));
                async move { result }.boxed()
            });
    }

    #[tokio::test]
    async fn should_finish_on_ready() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(Opcode::Ready, vec![])),
        );

        startup(
            &transport,
            "h",
            &NoneAuthenticatorProvider,
            Compression::None,
            Version::V4,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn should_authenticate_with_password() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(
                Opcode::Authenticate,
                BodyResAuthenticate {
                    data: AUTHENTICATOR.into(),
                }
                .serialize_to_vec(),
            )),
        );
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::AuthResponse,
            Ok(response(
                Opcode::AuthSuccess,
                BodyAuthToken {
                    data: CBytes::new_null(),
                }
                .serialize_to_vec(),
            )),
        );

        startup(
            &transport,
            "h",
            &StaticPasswordAuthenticatorProvider::new("user", "pass"),
            Compression::Lz4,
            Version::V4,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn should_report_rejected_credentials() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(
                Opcode::Authenticate,
                BodyResAuthenticate {
                    data: AUTHENTICATOR.into(),
                }
                .serialize_to_vec(),
            )),
        );
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::AuthResponse,
            Err(Error::Server {
                body: ErrorBody::new(ErrorCode::Authentication, "Bad credentials"),
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9042),
            }),
        );

        let error = startup(
            &transport,
            "h",
            &StaticPasswordAuthenticatorProvider::new("user", "wrong"),
            Compression::None,
            Version::V4,
        )
        .await
        .unwrap_err();

        assert_eq!(error.phase, ConnectionPhase::Authentication);
    }

    #[tokio::test]
    async fn should_report_timeout_during_authentication_as_startup_failure() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(
                Opcode::Authenticate,
                BodyResAuthenticate {
                    data: AUTHENTICATOR.into(),
                }
                .serialize_to_vec(),
            )),
        );
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::AuthResponse,
            Err(Error::Timeout("no response".into())),
        );

        let error = startup(
            &transport,
            "h",
            &StaticPasswordAuthenticatorProvider::new("user", "pass"),
            Compression::None,
            Version::V4,
        )
        .await
        .unwrap_err();

        assert_eq!(error.phase, ConnectionPhase::Startup);
        assert!(!error.is_authentication());
        assert!(matches!(error.source, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn should_require_credentials_when_asked() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(
                Opcode::Authenticate,
                BodyResAuthenticate {
                    data: AUTHENTICATOR.into(),
                }
                .serialize_to_vec(),
            )),
        );

        let error = startup(
            &transport,
            "h",
            &NoneAuthenticatorProvider,
            Compression::None,
            Version::V4,
        )
        .await
        .unwrap_err();

        assert!(error.is_authentication());
    }

    #[tokio::test]
    async fn should_reject_unexpected_startup_response() {
        let mut transport = MockCdrsTransport::new();
        let mut sequence = Sequence::new();
        expect_response(
            &mut transport,
            &mut sequence,
            Opcode::Startup,
            Ok(response(Opcode::Supported, vec![0, 0])),
        );

        let error = startup(
            &transport,
            "h",
            &NoneAuthenticatorProvider,
            Compression::None,
            Version::V4,
        )
        .await
        .unwrap_err();

        assert_eq!(error.phase, ConnectionPhase::Startup);
        assert!(matches!(
            error.source,
            Error::UnexpectedStartupResponse(Opcode::Supported)
        ));
    }
}

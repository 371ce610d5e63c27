mod common;

use std::time::Duration;

use cdrs_connector::cluster::{
    ConnectionConfigBuilder, TlsConfig, TlsProtocol, TrustStoreType,
};
use cdrs_connector::error::{ConnectionPhase, Error, SecurityConfigError};
use cdrs_connector::factory::{ConnectionFactory, DefaultConnectionFactory};
use cdrs_connector::frame::{Envelope, Opcode, Version};
use common::*;

fn config(port: u16, tls: TlsConfig) -> ConnectionConfigBuilder {
    ConnectionConfigBuilder::new()
        .with_contact_host("127.0.0.1")
        .with_port(port)
        .with_connect_timeout(Duration::from_secs(2))
        .with_tls(tls)
}

#[tokio::test]
async fn should_connect_with_pem_trust_store() {
    let node = FakeNodeBuilder::new().with_tls().start().await;
    let tls = TlsConfig::enabled().with_trust_store(resource("ca.pem"), TrustStoreType::Pem, None);

    let cluster = DefaultConnectionFactory
        .create_cluster(config(node.port(), tls).build().unwrap())
        .await
        .unwrap();

    assert!(cluster.nodes()[0].is_up());
    assert_eq!(node.stats().tls_failures(), 0);

    let response = cluster
        .send_envelope(&Envelope::new_req_options(Version::V4), true)
        .await
        .unwrap();
    assert_eq!(response.opcode, Opcode::Supported);
}

#[tokio::test]
async fn should_connect_with_pkcs12_trust_store_and_suites() {
    let node = FakeNodeBuilder::new()
        .with_tls()
        .with_credentials("cassandra", "secret")
        .start()
        .await;

    let tls = TlsConfig::enabled()
        .with_trust_store(
            resource("truststore.p12"),
            TrustStoreType::Pkcs12,
            Some("changeit".into()),
        )
        .with_protocol(TlsProtocol::TlsV12)
        .with_cipher_suites([
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
            "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        ]);

    let cluster = DefaultConnectionFactory
        .create_cluster(
            config(node.port(), tls)
                .with_password_auth("cassandra", "secret")
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(cluster.nodes()[0].is_up());
}

#[tokio::test]
async fn should_attempt_handshake_with_default_trust() {
    let node = FakeNodeBuilder::new().with_tls().start().await;

    let error = DefaultConnectionFactory
        .create_cluster(
            config(node.port(), TlsConfig::enabled())
                .build()
                .unwrap(),
        )
        .await
        .unwrap_err();

    // the test CA is not a public root, so the handshake must fail instead of going plaintext
    match error {
        Error::Connection(error) => assert_eq!(error.phase, ConnectionPhase::TlsHandshake),
        error => panic!("unexpected error: {error}"),
    }

    assert!(eventually(|| node.stats().tls_failures() > 0).await);
    assert_eq!(node.stats().queries(), 0);
}

#[tokio::test]
async fn should_fail_against_plaintext_node() {
    let node = FakeNodeBuilder::new().start().await;
    let tls = TlsConfig::enabled().with_trust_store(resource("ca.der"), TrustStoreType::Der, None);

    let error = DefaultConnectionFactory
        .create_cluster(config(node.port(), tls).build().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Connection(error) if error.phase == ConnectionPhase::TlsHandshake
    ));
    assert_eq!(node.stats().queries(), 0);
}

#[tokio::test]
async fn should_not_connect_with_wrong_trust_store_password() {
    let node = FakeNodeBuilder::new().with_tls().start().await;
    let tls = TlsConfig::enabled().with_trust_store(
        resource("truststore.p12"),
        TrustStoreType::Pkcs12,
        Some("wrong".into()),
    );

    let error = DefaultConnectionFactory
        .create_cluster(config(node.port(), tls).build().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Security(SecurityConfigError::WrongPassword)
    ));
    assert_eq!(node.stats().accepted(), 0);
}

#[tokio::test]
async fn should_report_missing_trust_store() {
    let tls = TlsConfig::enabled().with_trust_store(
        resource("missing.pem"),
        TrustStoreType::Pem,
        None,
    );

    let error = DefaultConnectionFactory
        .create_cluster(config(9042, tls).build().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Security(SecurityConfigError::TrustStoreIo { .. })
    ));
}

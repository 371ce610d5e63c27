//! **cdrs-connector** turns a declarative connection configuration into a live, managed
//! connection to a Cassandra cluster.
//!
//! ## Getting started
//!
//! ```no_run
//! use cdrs_connector::cluster::ConnectionConfigBuilder;
//! use cdrs_connector::factory::{ConnectionFactory, DefaultConnectionFactory};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConnectionConfigBuilder::new()
//!         .with_contact_host("127.0.0.1")
//!         .with_local_dc("dc1")
//!         .build()
//!         .unwrap();
//!
//!     let cluster = DefaultConnectionFactory
//!         .create_cluster(config)
//!         .await
//!         .unwrap();
//!
//!     cluster.shutdown().await;
//! }
//! ```
//!
//! ## Pluggable factories
//!
//! Anything implementing [`ConnectionFactory`](crate::factory::ConnectionFactory) can be
//! registered in a [`FactoryRegistry`](crate::factory::FactoryRegistry) and selected by name
//! through [`ConnectorSettings`](crate::settings::ConnectorSettings). A factory may declare
//! additional option names it understands, so the settings validator does not reject them.

pub mod cluster;
pub mod error;
pub mod factory;
pub mod future;
pub mod load_balancing;
pub mod retry;
pub mod settings;
pub mod tls;
pub mod transport;

pub use cdrs_connector_protocol::authenticators;
pub use cdrs_connector_protocol::compression;
pub use cdrs_connector_protocol::error as protocol_error;
pub use cdrs_connector_protocol::frame;
pub use cdrs_connector_protocol::types;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;

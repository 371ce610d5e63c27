//! Connection factories turn a [`ConnectionConfig`] into an established [`Cluster`]. The rest of
//! the system only depends on [`ConnectionFactory`], so custom implementations can be swapped in
//! through a [`FactoryRegistry`].
use fxhash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::*;

use crate::cluster::{Cluster, ConnectionConfig};
use crate::error::{ConfigurationError, Result};
use crate::future::BoxFuture;
use crate::settings::ConnectorSettings;

mod default_factory;

pub use self::default_factory::DefaultConnectionFactory;

/// Name the default factory is registered under.
pub const DEFAULT_FACTORY_NAME: &str = "default";

/// Creates established cluster connections. Implementations hold no per-connection state, so a
/// single instance can serve any number of concurrent requests.
pub trait ConnectionFactory: Send + Sync {
    /// Connects to the cluster described by given configuration.
    fn create_cluster(&self, config: ConnectionConfig) -> BoxFuture<'_, Result<Cluster>>;

    /// Option names understood by this factory, in addition to the standard ones. Settings
    /// validation accepts them instead of reporting them as unknown.
    fn recognized_properties(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Named connection factories. The default factory is always available under
/// [`DEFAULT_FACTORY_NAME`].
#[derive(Clone)]
pub struct FactoryRegistry {
    factories: FxHashMap<String, Arc<dyn ConnectionFactory>>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        let mut registry = FactoryRegistry {
            factories: Default::default(),
        };

        registry.register(DEFAULT_FACTORY_NAME, Arc::new(DefaultConnectionFactory));
        registry
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a factory under given name, returning the one it replaces, if any.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Option<Arc<dyn ConnectionFactory>> {
        self.factories.insert(name.into(), factory)
    }

    /// Names of all registered factories, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up a factory by name. No name selects the default factory.
    pub fn resolve(
        &self,
        name: Option<&str>,
    ) -> std::result::Result<Arc<dyn ConnectionFactory>, ConfigurationError> {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FACTORY_NAME);

        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownFactory(name.to_string()))
    }

    /// Connects using transmitted settings: resolves the selected factory, validates the options
    /// against it and hands over the resulting configuration.
    pub async fn connect(&self, settings: &ConnectorSettings) -> Result<Cluster> {
        let factory = self.resolve(settings.factory_name())?;
        settings.validate(factory.as_ref())?;

        let config = settings.to_connection_config()?;
        debug!(hosts = ?config.hosts(), port = config.port(), "Connecting with settings.");

        factory.create_cluster(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::FutureExt;
    use maplit::btreeset;

    struct RejectingFactory;

    impl ConnectionFactory for RejectingFactory {
        fn create_cluster(&self, _config: ConnectionConfig) -> BoxFuture<'_, Result<Cluster>> {
            async { Err(ConfigurationError::UnknownFactory("rejecting".into()).into()) }.boxed()
        }

        fn recognized_properties(&self) -> BTreeSet<String> {
            btreeset! {"connection.custom".to_string()}
        }
    }

    #[test]
    fn should_resolve_default_factory() {
        let registry = FactoryRegistry::new();

        assert_eq!(registry.names(), vec![DEFAULT_FACTORY_NAME]);
        assert!(registry.resolve(None).is_ok());
        assert!(registry.resolve(Some(" ")).is_ok());
        assert!(registry
            .resolve(Some(DEFAULT_FACTORY_NAME))
            .unwrap()
            .recognized_properties()
            .is_empty());
    }

    #[test]
    fn should_reject_unknown_factory() {
        let registry = FactoryRegistry::new();
        assert_eq!(
            registry.resolve(Some("missing")).err(),
            Some(ConfigurationError::UnknownFactory("missing".into()))
        );
    }

    #[tokio::test]
    async fn should_connect_through_registered_factory() {
        let mut registry = FactoryRegistry::new();
        assert!(registry
            .register("rejecting", Arc::new(RejectingFactory))
            .is_none());

        let settings = ConnectorSettings::new()
            .with("connection.factory", "rejecting")
            .with("connection.host", "10.0.0.1")
            .with("connection.custom", "value");

        let error = registry.connect(&settings).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Configuration(ConfigurationError::UnknownFactory(name)) if name == "rejecting"
        ));
    }

    #[tokio::test]
    async fn should_validate_against_selected_factory() {
        let registry = FactoryRegistry::new();
        let settings = ConnectorSettings::new()
            .with("connection.host", "10.0.0.1")
            .with("connection.custom", "value");

        let error = registry.connect(&settings).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Configuration(ConfigurationError::UnknownProperties(names))
                if names == vec!["connection.custom".to_string()]
        ));
    }
}

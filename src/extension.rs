//! Extension registry - named plugin families with lazy singletons.
//!
//! Every pluggable concern (serialization, load balancing, method invocation,
//! proxy creation) is an [`ExtensionPoint`]: a map from name to factory.
//! Resolution constructs the implementation lazily and memoizes it, so each
//! name yields exactly one shared instance no matter how many tasks race on
//! the first resolve.
//!
//! [`Extensions`] bundles the four families and is passed by reference to
//! whatever needs plugins; there is no process-global registry.
//!
//! # Example
//!
//! ```
//! use wirecall::extension::Extensions;
//!
//! let extensions = Extensions::with_builtins();
//! let msgpack = extensions.serialization("msgpack").unwrap();
//! assert_eq!(msgpack.name(), "msgpack");
//!
//! // Empty name means the family default.
//! let default = extensions.serialization("").unwrap();
//! assert_eq!(default.name(), "json");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Result, RpcError};
use crate::invoker::{MethodInvoker, TableInvoker};
use crate::loadbalancer::{
    ConnectionTracker, ConsistentHashLoadBalancer, ConsistentHashWeightLoadBalancer,
    HashLoadBalancer, HashWeightLoadBalancer, LeastConnectionsLoadBalancer, LoadBalancer,
    RoundRobinLoadBalancer, RoundRobinWeightLoadBalancer, SourceIpHashWeightLoadBalancer,
};
use crate::protocol::validate_serialization_name;
use crate::proxy::{ObjectProxyFactory, ProxyFactory};
use crate::serialization::{JsonSerialization, MsgPackSerialization, Serialization};

type Factory<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

struct Entry<T: ?Sized> {
    factory: Factory<T>,
    instance: OnceLock<Arc<T>>,
}

/// One plugin family: name -> factory, with memoized construction.
pub struct ExtensionPoint<T: ?Sized + Send + Sync> {
    family: &'static str,
    default_name: &'static str,
    entries: RwLock<HashMap<String, Arc<Entry<T>>>>,
}

impl<T: ?Sized + Send + Sync> ExtensionPoint<T> {
    pub fn new(family: &'static str, default_name: &'static str) -> Self {
        Self {
            family,
            default_name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under a name.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the name is already taken. Factories
    /// cannot be compared, so re-registration is always rejected rather than
    /// tolerated for "the same" implementation.
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&name) {
            return Err(RpcError::Config(format!(
                "{} extension `{name}` is already registered",
                self.family
            )));
        }
        entries.insert(
            name,
            Arc::new(Entry {
                factory: Box::new(factory),
                instance: OnceLock::new(),
            }),
        );
        Ok(())
    }

    /// Construction-time registration of built-ins; names are distinct by
    /// construction so the duplicate check is skipped.
    fn install<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            name.to_string(),
            Arc::new(Entry {
                factory: Box::new(factory),
                instance: OnceLock::new(),
            }),
        );
    }

    /// Resolve a name to its memoized singleton, constructing it on first
    /// use. An empty name resolves the family default.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an unknown name.
    pub fn resolve(&self, name: &str) -> Result<Arc<T>> {
        let name = if name.is_empty() { self.default_name } else { name };

        let entry = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(name).cloned().ok_or_else(|| {
                RpcError::Config(format!(
                    "no {} extension registered under `{name}`",
                    self.family
                ))
            })?
        };

        // OnceLock guarantees a single construction under races; losers get
        // the winner's instance.
        Ok(entry.instance.get_or_init(|| (entry.factory)()).clone())
    }

    /// Resolve the family default.
    pub fn resolve_default(&self) -> Result<Arc<T>> {
        self.resolve(self.default_name)
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }
}

/// The four plugin families plus the connection tracker they share.
pub struct Extensions {
    serializations: ExtensionPoint<dyn Serialization>,
    load_balancers: ExtensionPoint<dyn LoadBalancer>,
    invokers: ExtensionPoint<dyn MethodInvoker>,
    proxy_factories: ExtensionPoint<dyn ProxyFactory>,
    tracker: Arc<ConnectionTracker>,
}

impl Extensions {
    /// A registry populated with every built-in implementation.
    pub fn with_builtins() -> Self {
        let serializations: ExtensionPoint<dyn Serialization> =
            ExtensionPoint::new("serialization", "json");
        serializations.install("json", || Arc::new(JsonSerialization));
        serializations.install("msgpack", || Arc::new(MsgPackSerialization));

        let tracker = Arc::new(ConnectionTracker::new());

        let load_balancers: ExtensionPoint<dyn LoadBalancer> =
            ExtensionPoint::new("load balancer", "random");
        load_balancers.install("random", || Arc::new(HashLoadBalancer));
        load_balancers.install("hash", || Arc::new(HashLoadBalancer));
        load_balancers.install("random_weight", || Arc::new(HashWeightLoadBalancer));
        load_balancers.install("hash_weight", || Arc::new(HashWeightLoadBalancer));
        load_balancers.install("round_robin", || Arc::<RoundRobinLoadBalancer>::default());
        load_balancers.install("round_robin_weight", || {
            Arc::<RoundRobinWeightLoadBalancer>::default()
        });
        load_balancers.install("consistent_hash", || Arc::new(ConsistentHashLoadBalancer));
        load_balancers.install("consistent_hash_weight", || {
            Arc::new(ConsistentHashWeightLoadBalancer)
        });
        load_balancers.install("source_ip_hash_weight", || Arc::new(SourceIpHashWeightLoadBalancer));
        let lc_tracker = tracker.clone();
        load_balancers.install("least_connections", move || {
            Arc::new(LeastConnectionsLoadBalancer::new(lc_tracker.clone()))
        });

        let invokers: ExtensionPoint<dyn MethodInvoker> =
            ExtensionPoint::new("method invoker", "table");
        invokers.install("table", || Arc::new(TableInvoker));

        let proxy_factories: ExtensionPoint<dyn ProxyFactory> =
            ExtensionPoint::new("proxy factory", "object");
        proxy_factories.install("object", || Arc::new(ObjectProxyFactory));

        Self {
            serializations,
            load_balancers,
            invokers,
            proxy_factories,
            tracker,
        }
    }

    pub fn serialization(&self, name: &str) -> Result<Arc<dyn Serialization>> {
        self.serializations.resolve(name)
    }

    pub fn load_balancer(&self, name: &str) -> Result<Arc<dyn LoadBalancer>> {
        self.load_balancers.resolve(name)
    }

    pub fn invoker(&self, name: &str) -> Result<Arc<dyn MethodInvoker>> {
        self.invokers.resolve(name)
    }

    pub fn proxy_factory(&self, name: &str) -> Result<Arc<dyn ProxyFactory>> {
        self.proxy_factories.resolve(name)
    }

    /// Register a serialization backend, checking that its name fits the
    /// header's 16-byte field.
    pub fn register_serialization<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn Serialization> + Send + Sync + 'static,
    {
        validate_serialization_name(name)?;
        self.serializations.register(name, factory)
    }

    pub fn register_load_balancer<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn LoadBalancer> + Send + Sync + 'static,
    {
        self.load_balancers.register(name, factory)
    }

    pub fn register_invoker<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn MethodInvoker> + Send + Sync + 'static,
    {
        self.invokers.register(name, factory)
    }

    pub fn register_proxy_factory<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn ProxyFactory> + Send + Sync + 'static,
    {
        self.proxy_factories.register(name, factory)
    }

    /// The connection tracker shared with the `least_connections` strategy.
    pub fn connection_tracker(&self) -> Arc<ConnectionTracker> {
        self.tracker.clone()
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resolve_constructs_once_and_memoizes() {
        let point: ExtensionPoint<dyn Serialization> = ExtensionPoint::new("serialization", "json");
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        point
            .register("json", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(JsonSerialization)
            })
            .unwrap();

        let first = point.resolve("json").unwrap();
        let second = point.resolve("json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_resolve_yields_one_instance() {
        let point: Arc<ExtensionPoint<dyn Serialization>> =
            Arc::new(ExtensionPoint::new("serialization", "json"));
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        point
            .register("json", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(JsonSerialization)
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let point = point.clone();
                std::thread::spawn(move || point.resolve("json").unwrap())
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }

    #[test]
    fn test_duplicate_registration_is_config_error() {
        let extensions = Extensions::with_builtins();
        let err = extensions
            .register_serialization("json", || Arc::new(JsonSerialization))
            .unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let extensions = Extensions::with_builtins();
        assert!(matches!(
            extensions.serialization("protobuf"),
            Err(RpcError::Config(_))
        ));
    }

    #[test]
    fn test_empty_name_resolves_default() {
        let extensions = Extensions::with_builtins();
        assert_eq!(extensions.serialization("").unwrap().name(), "json");
    }

    #[test]
    fn test_builtin_balancers_are_registered() {
        let extensions = Extensions::with_builtins();
        for name in [
            "random",
            "hash",
            "random_weight",
            "hash_weight",
            "round_robin",
            "round_robin_weight",
            "consistent_hash",
            "consistent_hash_weight",
            "source_ip_hash_weight",
            "least_connections",
        ] {
            assert!(extensions.load_balancer(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn test_serialization_name_validated_on_registration() {
        let extensions = Extensions::with_builtins();
        let err = extensions
            .register_serialization("this-name-is-way-too-long", || Arc::new(JsonSerialization))
            .unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }
}

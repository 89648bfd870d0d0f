//! In-process registry backend.
//!
//! Holds published instances in a map keyed by service key. Useful on its
//! own for single-process deployments and as the shared registry in tests:
//! hand the same `Arc<LocalRegistry>` to the server and the client.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::{RegistryConfig, ServiceMeta, ServiceRegistry};
use crate::error::Result;
use crate::extension::Extensions;
use crate::loadbalancer::LoadBalancer;

pub struct LocalRegistry {
    services: RwLock<HashMap<String, Vec<ServiceMeta>>>,
    balancer: Arc<dyn LoadBalancer>,
}

impl LocalRegistry {
    /// Build the backend, resolving the configured load balancer up front.
    pub fn new(config: &RegistryConfig, extensions: &Arc<Extensions>) -> Result<Self> {
        let balancer = extensions.load_balancer(&config.load_balancer)?;
        Ok(Self {
            services: RwLock::new(HashMap::new()),
            balancer,
        })
    }
}

#[async_trait]
impl ServiceRegistry for LocalRegistry {
    async fn register(&self, meta: ServiceMeta) -> Result<()> {
        let key = meta.service_key();
        debug!(service_key = %key, endpoint = %meta.endpoint(), "registering instance");

        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        let instances = services.entry(key).or_default();
        if !instances.contains(&meta) {
            instances.push(meta);
        }
        Ok(())
    }

    async fn unregister(&self, meta: &ServiceMeta) -> Result<()> {
        let key = meta.service_key();
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if let Some(instances) = services.get_mut(&key) {
            instances.retain(|m| m != meta);
            if instances.is_empty() {
                services.remove(&key);
            }
        }
        Ok(())
    }

    async fn discover(
        &self,
        service_key: &str,
        hash: u64,
        source_ip: Option<&str>,
    ) -> Result<Option<ServiceMeta>> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        let instances = match services.get(service_key) {
            Some(instances) => instances,
            None => return Ok(None),
        };
        Ok(self.balancer.select(instances, hash, source_ip))
    }

    async fn destroy(&self) -> Result<()> {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        services.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(port: u16) -> ServiceMeta {
        ServiceMeta {
            service_name: "Demo".into(),
            service_version: "1.0.0".into(),
            service_group: "g".into(),
            service_addr: "127.0.0.1".into(),
            service_port: port,
            weight: 1,
        }
    }

    fn registry() -> LocalRegistry {
        let extensions = Arc::new(Extensions::with_builtins());
        LocalRegistry::new(&RegistryConfig::default(), &extensions).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_discover() {
        let registry = registry();
        registry.register(meta(9000)).await.unwrap();

        let found = registry.discover("Demo#1.0.0#g", 0, None).await.unwrap();
        assert_eq!(found, Some(meta(9000)));
    }

    #[tokio::test]
    async fn test_discover_unknown_key_is_none() {
        let registry = registry();
        let found = registry.discover("Ghost#1.0.0#g", 0, None).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = registry();
        registry.register(meta(9000)).await.unwrap();
        registry.register(meta(9000)).await.unwrap();

        let services = registry.services.read().unwrap();
        assert_eq!(services["Demo#1.0.0#g"].len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_instance() {
        let registry = registry();
        registry.register(meta(9000)).await.unwrap();
        registry.register(meta(9001)).await.unwrap();
        registry.unregister(&meta(9000)).await.unwrap();

        for _ in 0..10 {
            let found = registry
                .discover("Demo#1.0.0#g", 0, None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.service_port, 9001);
        }

        registry.unregister(&meta(9001)).await.unwrap();
        let found = registry.discover("Demo#1.0.0#g", 0, None).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_destroy_clears_everything() {
        let registry = registry();
        registry.register(meta(9000)).await.unwrap();
        registry.destroy().await.unwrap();
        assert!(registry
            .discover("Demo#1.0.0#g", 0, None)
            .await
            .unwrap()
            .is_none());
    }
}

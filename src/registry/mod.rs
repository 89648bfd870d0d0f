//! Service registry - the discovery seam between consumers and providers.
//!
//! Providers publish [`ServiceMeta`] records under their service key;
//! consumers discover one instance per call, with the registry applying the
//! configured load-balancing strategy to the candidate set. External
//! coordination backends plug in behind [`ServiceRegistry`]; the bundled
//! [`LocalRegistry`] keeps the records in process.

mod local;

pub use local::LocalRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::message::service_key;

/// One published provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceMeta {
    pub service_name: String,
    pub service_version: String,
    pub service_group: String,
    pub service_addr: String,
    pub service_port: u16,
    /// Relative capacity for the weighted strategies; 0 takes the instance
    /// out of weighted rotation.
    pub weight: u32,
}

impl ServiceMeta {
    /// The key this instance is published under.
    pub fn service_key(&self) -> String {
        service_key(&self.service_name, &self.service_version, &self.service_group)
    }

    /// `addr:port`, the connection-cache key for this instance.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.service_addr, self.service_port)
    }
}

/// Registry operations shared by all backends.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Publish an instance.
    async fn register(&self, meta: ServiceMeta) -> Result<()>;

    /// Withdraw an instance.
    async fn unregister(&self, meta: &ServiceMeta) -> Result<()>;

    /// Discover one instance for a service key, applying the configured
    /// load balancer. `Ok(None)` means nothing is published under the key.
    async fn discover(
        &self,
        service_key: &str,
        hash: u64,
        source_ip: Option<&str>,
    ) -> Result<Option<ServiceMeta>>;

    /// Release backend resources.
    async fn destroy(&self) -> Result<()>;
}

/// Registry backend selection and strategy wiring.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Backend address; unused by the `local` backend.
    pub registry_addr: String,
    /// Backend name; only `local` is bundled.
    pub registry_type: String,
    /// Load-balancer extension name applied during discovery.
    pub load_balancer: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_addr: String::new(),
            registry_type: "local".into(),
            load_balancer: "random".into(),
        }
    }
}

/// Construct the configured registry backend.
///
/// Unknown backend or load-balancer names fail here, before any call is made.
pub fn build_registry(
    config: &RegistryConfig,
    extensions: &Arc<Extensions>,
) -> Result<Arc<dyn ServiceRegistry>> {
    match config.registry_type.as_str() {
        "local" => Ok(Arc::new(LocalRegistry::new(config, extensions)?)),
        other => Err(RpcError::Config(format!(
            "unknown registry type: {other}"
        ))),
    }
}

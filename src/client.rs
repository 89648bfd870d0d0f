//! Consumer-side bootstrap.
//!
//! [`RpcClient`] wires the extension registry, the service registry and the
//! consumer engine together and hands out [`ServiceProxy`] stubs. Per-client
//! defaults (serializer, version/group, timeout, calling mode) apply to
//! every proxy it creates.
//!
//! # Example
//!
//! ```no_run
//! use wirecall::{RpcClient, RegistryConfig};
//! use serde_json::json;
//!
//! # async fn run() -> wirecall::Result<()> {
//! let client = RpcClient::builder()
//!     .registry_config(RegistryConfig::default())
//!     .version("1.0.0")
//!     .group("g")
//!     .build()?;
//!
//! let demo = client.proxy("Demo")?;
//! let greeting = demo.call("hello", vec![json!("world")]).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::consumer::{ConsumerConfig, RpcConsumer, RpcContext, DEFAULT_REQUEST_TIMEOUT};
use crate::error::Result;
use crate::extension::Extensions;
use crate::proxy::{ProxyConfig, ServiceProxy};
use crate::registry::{build_registry, RegistryConfig, ServiceRegistry};

/// Builder for [`RpcClient`].
pub struct RpcClientBuilder {
    registry: Option<Arc<dyn ServiceRegistry>>,
    registry_config: RegistryConfig,
    extensions: Option<Arc<Extensions>>,
    consumer_config: ConsumerConfig,
    serialization: String,
    proxy_factory: String,
    version: String,
    group: String,
    timeout: Duration,
    async_mode: bool,
    oneway: bool,
}

impl RpcClientBuilder {
    fn new() -> Self {
        Self {
            registry: None,
            registry_config: RegistryConfig::default(),
            extensions: None,
            consumer_config: ConsumerConfig::default(),
            serialization: String::new(),
            proxy_factory: String::new(),
            version: "1.0.0".into(),
            group: String::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            async_mode: false,
            oneway: false,
        }
    }

    /// Use an existing registry instance instead of building one from
    /// [`RegistryConfig`].
    pub fn registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    pub fn extensions(mut self, extensions: Arc<Extensions>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn consumer_config(mut self, config: ConsumerConfig) -> Self {
        self.consumer_config = config;
        self
    }

    /// Serialization extension name; empty means the default.
    pub fn serialization(mut self, name: impl Into<String>) -> Self {
        self.serialization = name.into();
        self
    }

    /// Proxy-factory extension name; empty means the default.
    pub fn proxy_factory(mut self, name: impl Into<String>) -> Self {
        self.proxy_factory = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Timeout applied by sync-mode calls on proxies from this client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deposit futures in the client's [`RpcContext`] instead of awaiting.
    pub fn async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    /// Fire-and-forget calls.
    pub fn oneway(mut self, oneway: bool) -> Self {
        self.oneway = oneway;
        self
    }

    /// Validate extension names and assemble the client.
    pub fn build(self) -> Result<RpcClient> {
        let extensions = self
            .extensions
            .unwrap_or_else(|| Arc::new(Extensions::with_builtins()));

        // Fail fast on unknown names rather than on the first call.
        extensions.serialization(&self.serialization)?;
        extensions.proxy_factory(&self.proxy_factory)?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => build_registry(&self.registry_config, &extensions)?,
        };

        let consumer = Arc::new(RpcConsumer::new(extensions.clone(), self.consumer_config));

        Ok(RpcClient {
            extensions,
            registry,
            consumer,
            context: Arc::new(RpcContext::new()),
            serialization: self.serialization,
            proxy_factory: self.proxy_factory,
            version: self.version,
            group: self.group,
            timeout: self.timeout,
            async_mode: self.async_mode,
            oneway: self.oneway,
        })
    }
}

/// Consumer-side entry point.
pub struct RpcClient {
    extensions: Arc<Extensions>,
    registry: Arc<dyn ServiceRegistry>,
    consumer: Arc<RpcConsumer>,
    context: Arc<RpcContext>,
    serialization: String,
    proxy_factory: String,
    version: String,
    group: String,
    timeout: Duration,
    async_mode: bool,
    oneway: bool,
}

impl RpcClient {
    pub fn builder() -> RpcClientBuilder {
        RpcClientBuilder::new()
    }

    /// Create a call stub for a service using the client's defaults.
    pub fn proxy(&self, service_name: impl Into<String>) -> Result<ServiceProxy> {
        let factory = self.extensions.proxy_factory(&self.proxy_factory)?;
        Ok(factory.create(ProxyConfig {
            service_name: service_name.into(),
            version: self.version.clone(),
            group: self.group.clone(),
            serialization: self.serialization.clone(),
            timeout: self.timeout,
            async_mode: self.async_mode,
            oneway: self.oneway,
            consumer: self.consumer.clone(),
            registry: self.registry.clone(),
            context: self.context.clone(),
        }))
    }

    /// The context async-mode calls deposit their futures into.
    pub fn context(&self) -> &Arc<RpcContext> {
        &self.context
    }

    pub fn extensions(&self) -> &Arc<Extensions> {
        &self.extensions
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Release registry resources.
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.destroy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn test_build_with_defaults() {
        let client = RpcClient::builder().group("g").build().unwrap();
        assert!(client.proxy("Demo").is_ok());
    }

    #[test]
    fn test_build_rejects_unknown_serialization() {
        let result = RpcClient::builder().serialization("protobuf").build();
        assert!(matches!(result, Err(RpcError::Config(_))));
    }

    #[test]
    fn test_build_rejects_unknown_proxy_factory() {
        let result = RpcClient::builder().proxy_factory("bytecode").build();
        assert!(matches!(result, Err(RpcError::Config(_))));
    }

    #[test]
    fn test_build_rejects_unknown_registry_type() {
        let config = RegistryConfig {
            registry_type: "etcd".into(),
            ..Default::default()
        };
        let result = RpcClient::builder().registry_config(config).build();
        assert!(matches!(result, Err(RpcError::Config(_))));
    }
}

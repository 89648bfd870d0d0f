//! Call stubs - the caller-facing face of a remote service.
//!
//! A [`ServiceProxy`] is bound to one service (name, version, group), a
//! serializer and a timeout, and turns method calls into requests through
//! the consumer engine. Proxies are created by a [`ProxyFactory`] resolved
//! by name from the extension registry; the bundled `object` factory builds
//! the plain proxy defined here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::consumer::{RpcConsumer, RpcContext, RpcFuture};
use crate::error::{Result, RpcError};
use crate::message::RpcRequest;
use crate::registry::ServiceRegistry;

/// Everything a proxy needs to make calls.
pub struct ProxyConfig {
    pub service_name: String,
    pub version: String,
    pub group: String,
    /// Serialization extension name; empty means the default.
    pub serialization: String,
    pub timeout: Duration,
    /// When set, `call` deposits its future in the context instead of
    /// awaiting it.
    pub async_mode: bool,
    /// When set, `call` fires and forgets.
    pub oneway: bool,
    pub consumer: Arc<RpcConsumer>,
    pub registry: Arc<dyn ServiceRegistry>,
    pub context: Arc<RpcContext>,
}

/// Creates call stubs; an extension family so stub construction is
/// swappable.
pub trait ProxyFactory: Send + Sync {
    fn create(&self, config: ProxyConfig) -> ServiceProxy;
}

/// The bundled factory: hands the configuration straight to
/// [`ServiceProxy`]. Registered as `object`, the family default.
pub struct ObjectProxyFactory;

impl ProxyFactory for ObjectProxyFactory {
    fn create(&self, config: ProxyConfig) -> ServiceProxy {
        ServiceProxy::new(config)
    }
}

/// A call stub bound to one remote service.
pub struct ServiceProxy {
    config: ProxyConfig,
}

impl ServiceProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Call a method honoring the configured mode.
    ///
    /// - one-way: fire and forget, returns `Value::Null`;
    /// - async mode: the future lands in the proxy's [`RpcContext`] and
    ///   `Value::Null` is returned immediately;
    /// - otherwise: awaits the response up to the configured timeout.
    pub async fn call(&self, method: &str, parameters: Vec<Value>) -> Result<Value> {
        if self.config.oneway {
            self.call_oneway(method, parameters).await?;
            return Ok(Value::Null);
        }

        if self.config.async_mode {
            let future = self.call_async(method, parameters).await?;
            self.config.context.put_future(future);
            return Ok(Value::Null);
        }

        let future = self.call_async(method, parameters).await?;
        future.wait(self.config.timeout).await
    }

    /// Send the request and return the response future directly.
    pub async fn call_async(&self, method: &str, parameters: Vec<Value>) -> Result<RpcFuture> {
        let request = self.build_request(method, parameters, false);
        let future = self
            .config
            .consumer
            .send_request(&self.config.registry, &self.config.serialization, request)
            .await?;
        // send_request only returns None for one-way requests.
        future.ok_or(RpcError::ConnectionClosed)
    }

    /// Send the request without expecting a response.
    pub async fn call_oneway(&self, method: &str, parameters: Vec<Value>) -> Result<()> {
        let request = self.build_request(method, parameters, true);
        self.config
            .consumer
            .send_request(&self.config.registry, &self.config.serialization, request)
            .await?;
        Ok(())
    }

    fn build_request(&self, method: &str, parameters: Vec<Value>, oneway: bool) -> RpcRequest {
        RpcRequest {
            service_name: self.config.service_name.clone(),
            method_name: method.to_string(),
            version: self.config.version.clone(),
            group: self.config.group.clone(),
            parameter_types: parameters.iter().map(value_type_name).collect(),
            parameters,
            async_mode: self.config.async_mode,
            oneway,
        }
    }
}

/// JSON type tag recorded in `parameter_types`.
fn value_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

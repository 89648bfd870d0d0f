//! Method invocation seam between the dispatch engine and service code.
//!
//! Dispatch goes through a [`MethodInvoker`] resolved by name from the
//! extension registry, so how a method name becomes a function call is
//! swappable. The bundled `table` invoker looks the method up in the
//! name-to-function table each service builds at registration time.

use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::provider::ServiceHandler;

/// Applies a named method of a service to its parameters.
pub trait MethodInvoker: Send + Sync {
    fn invoke(&self, handler: &ServiceHandler, method: &str, parameters: &[Value])
        -> Result<Value>;
}

/// Direct lookup in the service's registration table. The default.
pub struct TableInvoker;

impl MethodInvoker for TableInvoker {
    fn invoke(
        &self,
        handler: &ServiceHandler,
        method: &str,
        parameters: &[Value],
    ) -> Result<Value> {
        let function = handler
            .method(method)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))?;
        function(parameters)
    }
}

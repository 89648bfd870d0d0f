//! Per-service method tables built at registration time.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// A registered method: parameters in, result out.
pub type MethodFn = Box<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// The callable surface of one hosted service.
///
/// Methods are plain functions over JSON values, collected into a
/// name-to-function table when the service is registered. Dispatch resolves
/// method names against this table instead of any runtime reflection.
///
/// # Example
///
/// ```
/// use wirecall::provider::ServiceHandler;
/// use serde_json::{json, Value};
///
/// let handler = ServiceHandler::new().with_method("hello", |params: &[Value]| {
///     let name = params.first().and_then(Value::as_str).unwrap_or("world");
///     Ok(json!(format!("hello {name}")))
/// });
/// assert!(handler.method("hello").is_some());
/// ```
#[derive(Default)]
pub struct ServiceHandler {
    methods: HashMap<String, MethodFn>,
}

impl ServiceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method to the table. Re-adding a name replaces the function.
    pub fn with_method<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Box::new(function));
        self
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    /// Names of all registered methods, unordered.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

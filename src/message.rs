//! Request and response envelopes, service keys and request ids.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator joining the parts of a service key.
pub const SERVICE_KEY_SEPARATOR: &str = "#";

/// Request envelope carried in the body of a request frame.
///
/// Parameters travel as self-describing JSON values so every serialization
/// backend can carry them without knowing concrete parameter types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub service_name: String,
    pub method_name: String,
    pub version: String,
    pub group: String,
    pub parameter_types: Vec<String>,
    pub parameters: Vec<Value>,
    pub async_mode: bool,
    pub oneway: bool,
}

impl RpcRequest {
    /// The service key this request targets.
    pub fn service_key(&self) -> String {
        service_key(&self.service_name, &self.version, &self.group)
    }
}

/// Response envelope carried in the body of a response frame.
///
/// Exactly one of `result` and `error` is populated; `error` set means the
/// call failed on the provider side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<String>,
    pub async_mode: bool,
    pub oneway: bool,
}

impl RpcResponse {
    /// A success response echoing the request's mode flags.
    pub fn success(result: Value, request: &RpcRequest) -> Self {
        Self {
            result: Some(result),
            error: None,
            async_mode: request.async_mode,
            oneway: request.oneway,
        }
    }

    /// A failure response echoing the request's mode flags.
    pub fn failure(error: impl Into<String>, request: &RpcRequest) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
            async_mode: request.async_mode,
            oneway: request.oneway,
        }
    }
}

/// Build the registry/dispatch key `name#version#group`.
pub fn service_key(service_name: &str, version: &str, group: &str) -> String {
    [service_name, version, group].join(SERVICE_KEY_SEPARATOR)
}

/// Next process-wide request id.
pub fn next_request_id() -> u64 {
    static REQUEST_ID: AtomicU64 = AtomicU64::new(1);
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Stable hash used for routing decisions.
///
/// `DefaultHasher::new()` hashes with fixed keys, so the value is stable for
/// the lifetime of the process, which is all the ring and modulo strategies
/// need.
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Routing hash for a request: the first parameter when present, otherwise
/// the service key.
pub fn routing_hash(request: &RpcRequest) -> u64 {
    match request.parameters.first() {
        Some(param) => stable_hash(&param.to_string()),
        None => stable_hash(request.service_key().as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> RpcRequest {
        RpcRequest {
            service_name: "Demo".into(),
            method_name: "hello".into(),
            version: "1.0.0".into(),
            group: "g".into(),
            parameter_types: vec!["string".into()],
            parameters: vec![json!("world")],
            async_mode: false,
            oneway: false,
        }
    }

    #[test]
    fn test_service_key_format() {
        assert_eq!(service_key("Demo", "1.0.0", "g"), "Demo#1.0.0#g");
        assert_eq!(sample_request().service_key(), "Demo#1.0.0#g");
    }

    #[test]
    fn test_request_ids_are_unique_and_increasing() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[test]
    fn test_routing_hash_uses_first_parameter() {
        let request = sample_request();
        let mut other = request.clone();
        other.parameters = vec![json!("different")];
        assert_ne!(routing_hash(&request), routing_hash(&other));

        // Same first parameter hashes the same regardless of the rest.
        let mut more = request.clone();
        more.parameters.push(json!(42));
        assert_eq!(routing_hash(&request), routing_hash(&more));
    }

    #[test]
    fn test_routing_hash_falls_back_to_service_key() {
        let mut request = sample_request();
        request.parameters.clear();
        assert_eq!(
            routing_hash(&request),
            stable_hash(request.service_key().as_str())
        );
    }

    #[test]
    fn test_response_constructors() {
        let request = sample_request();
        let ok = RpcResponse::success(json!("hi"), &request);
        assert_eq!(ok.result, Some(json!("hi")));
        assert!(ok.error.is_none());

        let fail = RpcResponse::failure("boom", &request);
        assert!(fail.result.is_none());
        assert_eq!(fail.error.as_deref(), Some("boom"));
    }
}

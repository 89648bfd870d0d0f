//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (bad magic, malformed header, oversized body).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error (unknown extension name, duplicate registration).
    #[error("Configuration error: {0}")]
    Config(String),

    /// No provider hosts the requested service key.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The service exists but does not expose the requested method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Discovery returned no usable instance for the service key.
    #[error("no service instance available for: {0}")]
    NoInstanceAvailable(String),

    /// The provider answered with a failure response.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// No response arrived within the request timeout.
    #[error("request timed out: request id {request_id}, service {service}, method {method}")]
    Timeout {
        request_id: u64,
        service: String,
        method: String,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

//! Brickbridge Shared Protocol Types
//!
//! This crate provides the JSON-RPC envelope types and the framing codec
//! used between the bridge daemon and its local-socket clients.

pub mod codec;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version carried in every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// An inbound JSON-RPC request from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    /// Request id echoed back in the response. Absent for client-side
    /// notifications, which receive no reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An outbound JSON-RPC response correlated to a request by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Create a success response for the given request id
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response for the given request id
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A server-initiated notification. Tagged with the session's own
/// notification sequence, independent of the request/response id space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error codes surfaced to the peer
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// A structured JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Missing or malformed parameters (client may retry with corrected input)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: codes::INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    /// Operation invalid given the current session state
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: codes::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    /// Unknown method name
    pub fn method_not_found() -> Self {
        Self {
            code: codes::METHOD_NOT_FOUND,
            message: "Method not found".into(),
            data: None,
        }
    }

    /// Platform or hardware failure, reported but not retried by the bridge
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: codes::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a data payload (e.g. partial byte count on a failed send)
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::invalid_request("x").code, -32600);
        assert_eq!(RpcError::method_not_found().code, -32601);
        assert_eq!(RpcError::internal("x").code, -32603);
    }

    #[test]
    fn test_response_serialization() {
        let ok = Response::success(json!(1), json!(5));
        let text = serde_json::to_string(&ok).unwrap();
        assert!(text.contains("\"result\":5"));
        assert!(!text.contains("error"));

        let err = Response::failure(json!(2), RpcError::invalid_request("no peripheral connected"));
        let text = serde_json::to_string(&err).unwrap();
        assert!(text.contains("-32600"));
        assert!(!text.contains("result"));
    }

    #[test]
    fn test_error_data_roundtrip() {
        let err = RpcError::internal("failed to send message").with_data(json!({"bytesSent": 10}));
        let back: RpcError = serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert_eq!(back.data, Some(json!({"bytesSent": 10})));
    }

    #[test]
    fn test_request_params_default_to_null() {
        let req: Request = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"discover"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
        assert_eq!(req.id, Some(json!(1)));
    }
}

//! Typed parameter decoding at the dispatcher boundary
//!
//! Each method's parameter mapping is decoded once into a schema struct;
//! every missing or mismatched field surfaces as `InvalidParams` with the
//! serde detail string.

use base64::{engine::general_purpose, Engine as _};
use brickbridge_shared::RpcError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Parameters for `discover`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverParams {
    pub major_device_class: u32,
    pub minor_device_class: u32,
}

/// Parameters for `connect`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub peripheral_id: String,
}

/// Parameters for `disconnect`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectParams {
    pub peripheral_id: String,
}

/// Parameters for `send`
#[derive(Debug, Deserialize)]
pub struct SendParams {
    pub message: String,
    pub encoding: Encoding,
}

/// Supported payload encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Base64,
    Utf8,
}

/// Decode a parameter mapping into a method's schema struct
pub fn decode<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Decode the message of a `send` call into its byte representation.
///
/// A zero-byte base64 decode is treated the same as a decode failure. The
/// utf8 path accepts arbitrary text without validation.
pub fn decode_message(params: &SendParams) -> Result<Vec<u8>, RpcError> {
    match params.encoding {
        Encoding::Base64 => {
            let bytes = general_purpose::STANDARD
                .decode(&params.message)
                .map_err(|e| RpcError::invalid_params(format!("invalid base64 message: {}", e)))?;
            if bytes.is_empty() {
                return Err(RpcError::invalid_params("empty message"));
            }
            Ok(bytes)
        }
        Encoding::Utf8 => Ok(params.message.clone().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discover_params() {
        let p: DiscoverParams =
            decode(json!({"majorDeviceClass": 8, "minorDeviceClass": 1})).unwrap();
        assert_eq!((p.major_device_class, p.minor_device_class), (8, 1));
    }

    #[test]
    fn test_discover_missing_minor_is_invalid_params() {
        let err = decode::<DiscoverParams>(json!({"majorDeviceClass": 8})).unwrap_err();
        assert_eq!(err.code, brickbridge_shared::codes::INVALID_PARAMS);
    }

    #[test]
    fn test_negative_class_is_invalid_params() {
        let err =
            decode::<DiscoverParams>(json!({"majorDeviceClass": -1, "minorDeviceClass": 1}))
                .unwrap_err();
        assert_eq!(err.code, brickbridge_shared::codes::INVALID_PARAMS);
    }

    #[test]
    fn test_unsupported_encoding_is_invalid_params() {
        let err = decode::<SendParams>(json!({"message": "hi", "encoding": "hex"})).unwrap_err();
        assert_eq!(err.code, brickbridge_shared::codes::INVALID_PARAMS);
    }

    #[test]
    fn test_base64_message_decodes() {
        let p: SendParams = decode(json!({"message": "SGVsbG8=", "encoding": "base64"})).unwrap();
        assert_eq!(decode_message(&p).unwrap(), b"Hello");
    }

    #[test]
    fn test_malformed_base64_is_invalid_params() {
        let p: SendParams =
            decode(json!({"message": "not valid b64!!!", "encoding": "base64"})).unwrap();
        assert!(decode_message(&p).is_err());
    }

    #[test]
    fn test_empty_base64_decode_is_invalid_params() {
        let p: SendParams = decode(json!({"message": "", "encoding": "base64"})).unwrap();
        assert!(decode_message(&p).is_err());
    }

    #[test]
    fn test_utf8_accepts_arbitrary_text() {
        let p: SendParams = decode(json!({"message": "héllo", "encoding": "utf8"})).unwrap();
        assert_eq!(decode_message(&p).unwrap(), "héllo".as_bytes());
    }

    #[test]
    fn test_base64_roundtrip_binary() {
        // Arbitrary bytes, including non-UTF8
        let bytes: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        let encoded = general_purpose::STANDARD.encode(&bytes);
        assert_eq!(general_purpose::STANDARD.decode(&encoded).unwrap(), bytes);

        // Empty round-trips through the encoder too
        assert_eq!(general_purpose::STANDARD.encode(b""), "");
    }
}

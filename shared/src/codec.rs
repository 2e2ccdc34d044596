//! Newline-delimited JSON codec for local-socket framing
//!
//! All messages are framed as:
//! ```text
//! [ N bytes: JSON value, no embedded newlines ][ 1 byte: '\n' ]
//! ```
//!
//! This keeps message boundaries over the byte stream while staying
//! inspectable with ordinary line tools.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a message into a newline-terminated JSON frame
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, CodecError> {
    let json = serde_json::to_vec(msg)?;

    if json.len() >= MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(json.len()));
    }

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');

    Ok(buf.freeze())
}

/// Try to decode one newline-delimited JSON frame from a buffer
///
/// Returns:
/// - `Ok(Some(msg))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the frame is oversized or not valid JSON
pub fn decode<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, CodecError> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        // No complete line yet; refuse to buffer unbounded garbage
        if buf.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge(buf.len()));
        }
        return Ok(None);
    };

    if pos > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(pos));
    }

    // Split off the frame and consume the newline
    let frame = buf.split_to(pos);
    buf.advance(1);

    let msg = serde_json::from_slice(&frame)?;
    Ok(Some(msg))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response, RpcError};
    use serde_json::json;

    fn create_test_request() -> Request {
        Request {
            jsonrpc: crate::JSONRPC_VERSION.into(),
            id: Some(json!(7)),
            method: "discover".into(),
            params: json!({"majorDeviceClass": 8, "minorDeviceClass": 1}),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = create_test_request();

        let encoded = encode(&original).expect("encode failed");
        assert_eq!(*encoded.last().unwrap(), b'\n');

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded: Request = decode(&mut buf).expect("decode failed").expect("no message");

        assert_eq!(decoded.method, original.method);
        assert_eq!(decoded.params, original.params);
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode() {
        let encoded = encode(&create_test_request()).expect("encode failed");

        // Feed everything except the trailing newline
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        let result: Option<Request> = decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None without a newline");

        // Buffer should be unchanged (data not consumed)
        assert_eq!(buf.len(), encoded.len() - 1);
    }

    #[test]
    fn test_frame_decoder_chunked_input() {
        let encoded = encode(&create_test_request()).expect("encode failed");

        let mut decoder = FrameDecoder::new();

        decoder.extend(&encoded[..5]);
        assert!(decoder.decode_next::<Request>().expect("decode error").is_none());

        decoder.extend(&encoded[5..]);
        let decoded: Request = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have message");

        assert_eq!(decoded.method, "discover");
    }

    #[test]
    fn test_multiple_frames() {
        let req = create_test_request();
        let resp = Response::failure(json!(7), RpcError::method_not_found());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&req).unwrap());
        decoder.extend(&encode(&resp).unwrap());

        let first: Request = decoder.decode_next().unwrap().expect("first frame");
        assert_eq!(first.method, "discover");

        let second: Response = decoder.decode_next().unwrap().expect("second frame");
        assert_eq!(second.error.unwrap().code, crate::codes::METHOD_NOT_FOUND);

        assert!(decoder.decode_next::<Request>().unwrap().is_none());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"not json at all\n");
        assert!(decoder.decode_next::<Request>().is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::new();
        // A single unterminated line larger than the frame limit
        decoder.extend(&vec![b'x'; MAX_FRAME_SIZE + 2]);
        assert!(matches!(
            decoder.decode_next::<Request>(),
            Err(CodecError::FrameTooLarge(_))
        ));
    }
}

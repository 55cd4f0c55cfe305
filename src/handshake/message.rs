//! `Authorization: NTLM <base64>` parsing.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64ct::{Base64, Encoding};

use crate::error::AuthenticationError;

pub const SCHEME: &str = "NTLM";

// Offset of the message-type field, right after the 8-byte "NTLMSSP\0"
// signature.
const MESSAGE_TYPE_OFFSET: usize = 8;

/// Message-type value of a negotiate (type 1) message.
pub const NEGOTIATE: u8 = 1;

/// The base64 payload of an `NTLM` authorization header, or `None` when the
/// header is absent or uses another scheme.
pub fn ntlm_payload(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix(SCHEME)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// A decoded client message. Only the type byte is ever inspected here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NtlmMessage {
    bytes: Vec<u8>,
    message_type: u8,
}

impl NtlmMessage {
    /// # Errors
    /// Returns `InvalidEncoding` for bad base64 and `MessageTooShort` when the
    /// buffer does not reach the type byte.
    pub fn decode(payload: &str) -> Result<Self, AuthenticationError> {
        let bytes =
            Base64::decode_vec(payload).map_err(|_| AuthenticationError::InvalidEncoding)?;
        let message_type = *bytes
            .get(MESSAGE_TYPE_OFFSET)
            .ok_or(AuthenticationError::MessageTooShort { len: bytes.len() })?;
        Ok(Self {
            bytes,
            message_type,
        })
    }

    #[must_use]
    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    #[must_use]
    pub fn is_negotiate(&self) -> bool {
        self.message_type == NEGOTIATE
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    fn message(message_type: u8) -> Vec<u8> {
        let mut bytes = b"NTLMSSP\0".to_vec();
        bytes.extend_from_slice(&[message_type, 0, 0, 0]);
        bytes
    }

    #[test]
    fn payload_requires_ntlm_scheme() {
        assert_eq!(ntlm_payload(&HeaderMap::new()), None);
        assert_eq!(ntlm_payload(&headers("Bearer abc")), None);
        assert_eq!(ntlm_payload(&headers("Negotiate TlRMTVNTUAAB")), None);
        assert_eq!(ntlm_payload(&headers("NTLMish abc")), None);
        assert_eq!(ntlm_payload(&headers("NTLM abc=")), Some("abc="));
        assert_eq!(ntlm_payload(&headers("NTLM")), Some(""));
    }

    #[test]
    fn decode_reads_type_byte() {
        let negotiate = Base64::encode_string(&message(1));
        let decoded = NtlmMessage::decode(&negotiate).unwrap();
        assert!(decoded.is_negotiate());
        assert_eq!(decoded.as_bytes(), message(1).as_slice());

        let authenticate = Base64::encode_string(&message(3));
        let decoded = NtlmMessage::decode(&authenticate).unwrap();
        assert_eq!(decoded.message_type(), 3);
        assert!(!decoded.is_negotiate());
    }

    #[test]
    fn decode_accepts_minimal_nine_bytes() {
        let mut bytes = [0u8; 9];
        bytes[8] = NEGOTIATE;
        let decoded = NtlmMessage::decode(&Base64::encode_string(&bytes)).unwrap();
        assert!(decoded.is_negotiate());
    }

    #[test]
    fn decode_rejects_undersized_buffers() {
        for len in 0..=8 {
            let payload = Base64::encode_string(&vec![1u8; len]);
            assert!(matches!(
                NtlmMessage::decode(&payload),
                Err(AuthenticationError::MessageTooShort { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(
            NtlmMessage::decode("not base64!"),
            Err(AuthenticationError::InvalidEncoding)
        ));
    }
}

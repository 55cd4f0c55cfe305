use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::Response,
};
use base64ct::{Base64, Encoding};

use super::message::SCHEME;

/// `401` with a bare `WWW-Authenticate: NTLM`, starting (or restarting) the
/// handshake.
#[must_use]
pub fn start_handshake() -> Response {
    unauthorized(HeaderValue::from_static(SCHEME))
}

/// `401` carrying the engine's type 2 message.
#[must_use]
pub fn challenge(type2: &[u8]) -> Response {
    let value = format!("{SCHEME} {}", Base64::encode_string(type2));
    // Base64 output is always a valid header value.
    HeaderValue::from_str(&value).map_or_else(|_| start_handshake(), unauthorized)
}

/// Empty `500` for engine or session store faults.
#[must_use]
pub fn fault() -> Response {
    empty(StatusCode::INTERNAL_SERVER_ERROR)
}

fn unauthorized(authenticate: HeaderValue) -> Response {
    let mut response = empty(StatusCode::UNAUTHORIZED);
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, authenticate);
    response
}

fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

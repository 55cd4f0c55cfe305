use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
};
use std::net::SocketAddr;

use crate::cache::ClientIdentity;

/// Resolve the cache key for `request`.
///
/// An upstream layer may insert a [`ClientIdentity`] extension explicitly.
/// Otherwise proxy headers are consulted (only when `trust_forwarded` is set),
/// then the peer address from `ConnectInfo`, which requires serving with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn resolve(request: &Request, trust_forwarded: bool) -> Option<ClientIdentity> {
    if let Some(identity) = request.extensions().get::<ClientIdentity>() {
        return Some(identity.clone());
    }

    if trust_forwarded {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return Some(ClientIdentity::new(ip));
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientIdentity::from(addr.ip()))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<&str> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

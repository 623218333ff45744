//! Resolve the address a request comes from.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::{AppState, ServerError};

/// Client IP address.
///
/// Taken from the trusted proxy header when present, else from the socket
/// peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Proxies append to the list, the first entry is the client.
        let forwarded = parts
            .headers
            .get(state.config.proxy.ip_header.as_str())
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok());

        if let Some(ip) = forwarded {
            return Ok(ClientIp(ip));
        }

        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| ClientIp(addr.ip()))
            .ok_or(ServerError::MissingClientIp)
    }
}

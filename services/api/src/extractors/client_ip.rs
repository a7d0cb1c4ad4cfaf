use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Best-effort client address: last `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer.
///
/// Only the right-most forwarded hop is used. It is the one appended by the
/// proxy in front of the service; anything to its left came from the client.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl ClientIp {
    /// Rate limit identifier, `ip:<address>`.
    pub fn identifier(&self) -> String {
        format!("ip:{}", self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_value(parts, "x-forwarded-for")
            .and_then(|list| list.rsplit(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let ip = forwarded
            .or_else(|| header_value(parts, "x-real-ip"))
            .map(str::to_string)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientIp(ip))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

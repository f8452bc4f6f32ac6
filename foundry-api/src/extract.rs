/// Request extractors
///
/// Wrappers around axum's extractors that reject with [`ApiError`], so
/// malformed input gets the same JSON error body as everything else.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};
use validator::Validate;

use crate::error::ApiError;

/// JSON body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// JSON body checked with [`Validate`]; failures become 422 with field details
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Client details recorded in sessions and audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

const MAX_USER_AGENT_LENGTH: usize = 512;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse().ok()
}

impl RequestMeta {
    /// Reads `X-Forwarded-For` (first hop), then `X-Real-IP`, then the peer address
    ///
    /// Header values that are not an IP address are skipped.
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let ip_address = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(parse_ip)
            .or_else(|| header_str(headers, "x-real-ip").and_then(parse_ip))
            .or_else(|| peer.map(|addr| addr.ip()))
            .map(|ip| ip.to_string());

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(MAX_USER_AGENT_LENGTH).collect());

        Self {
            ip_address,
            user_agent,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(RequestMeta::from_headers(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let meta = RequestMeta::from_headers(&headers, "127.0.0.1:4000".parse().ok());
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_falls_back_to_peer() {
        let meta = RequestMeta::from_headers(&HeaderMap::new(), "192.0.2.1:5555".parse().ok());
        assert_eq!(meta.ip_address.as_deref(), Some("192.0.2.1"));
        assert_eq!(meta.user_agent, None);

        assert_eq!(RequestMeta::from_headers(&HeaderMap::new(), None), RequestMeta::default());
    }

    #[test]
    fn test_real_ip_used_without_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let meta = RequestMeta::from_headers(&headers, None);
        assert_eq!(meta.ip_address.as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_non_ip_headers_are_skipped() {
        let mut headers = HeaderMap::new();
        let junk = "a".repeat(100);
        headers.insert("x-forwarded-for", HeaderValue::from_str(&junk).unwrap());
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        let meta = RequestMeta::from_headers(&headers, "127.0.0.1:4000".parse().ok());
        assert_eq!(meta.ip_address.as_deref(), Some("2001:db8::1"));

        headers.insert("x-real-ip", HeaderValue::from_static("unknown"));
        let meta = RequestMeta::from_headers(&headers, "127.0.0.1:4000".parse().ok());
        assert_eq!(meta.ip_address.as_deref(), Some("127.0.0.1"));

        let meta = RequestMeta::from_headers(&headers, None);
        assert_eq!(meta.ip_address, None);
    }
}

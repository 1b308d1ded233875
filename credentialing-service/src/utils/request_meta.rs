use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use service_core::middleware::rate_limit::client_ip;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::RequestMeta;

const MAX_USER_AGENT_LEN: usize = 512;

/// Client IP and user agent of the current request, for sessions and audit.
pub struct ClientMeta(pub RequestMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let connect_info = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        let ip_address = client_ip(&parts.headers, connect_info).map(|ip| ip.to_string());

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Ok(ClientMeta(RequestMeta {
            ip_address,
            user_agent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn reads_forwarded_ip_and_user_agent() {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(USER_AGENT, "clinic-portal/1.0")
            .body(())
            .unwrap()
            .into_parts();

        let ClientMeta(meta) = ClientMeta::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("clinic-portal/1.0"));
    }

    #[tokio::test]
    async fn missing_headers_leave_fields_empty() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let ClientMeta(meta) = ClientMeta::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(meta, RequestMeta::default());
    }
}

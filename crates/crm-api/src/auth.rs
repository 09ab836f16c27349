//! Request identity: the acting user and where the request came from.
//!
//! Sessions are issued by the external auth service, which forwards the authenticated
//! user id in `x-user-id`. This layer only resolves that id against the directory.

use crate::error::ApiError;
use crate::server::AppState;
use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use crm_service::Actor;
use crm_types::{RequestOrigin, User};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

pub const USER_HEADER: &str = "x-user-id";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// The authenticated user making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn actor(&self, origin: RequestOrigin) -> Actor {
        Actor::new(self.0.id.clone(), origin)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let id = header_str(&parts.headers, USER_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Not authorized, no user"))?;
        match state.crm.users.get(id).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::debug!(user_id = id, "rejected unknown user");
                Err(ApiError::unauthorized("Not authorized, unknown user"))
            }
        }
    }
}

/// Client address and user agent attached to activity entries.
#[derive(Debug, Clone, Default)]
pub struct Origin(pub RequestOrigin);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Origin(origin_from(&parts.headers, peer)))
    }
}

/// First `x-forwarded-for` hop wins over the socket peer.
fn origin_from(headers: &HeaderMap, peer: Option<String>) -> RequestOrigin {
    let forwarded = header_str(headers, FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    RequestOrigin {
        ip_address: forwarded.or(peer),
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let o = origin_from(&headers, Some("127.0.0.1".to_string()));
        assert_eq!(o.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(o.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn falls_back_to_peer() {
        let o = origin_from(&HeaderMap::new(), Some("127.0.0.1".to_string()));
        assert_eq!(o.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(o.user_agent, None);
    }
}

/// Authentication middleware
use crate::{error::ServerError, services::AuthService};
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use orb_core::UserId;
use serde::Deserialize;
use std::sync::Arc;

/// Extension type to store the authenticated user in the request
/// Can be used as an extractor in handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub name: String,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the `Authorization` header, or the `token` query
/// parameter for clients that cannot set headers (media elements, WebSocket)
pub fn bearer_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Middleware that extracts and validates the bearer token
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token =
        bearer_token(request.headers(), request.uri()).ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify token
    let claims = auth_service.verify(&token).map_err(|e| {
        tracing::warn!("Token verification failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.user_id(),
        name: claims.display_name(),
    });

    Ok(next.run(request).await)
}

/// Implement FromRequestParts so AuthenticatedUser can be used as an extractor
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ServerError::Unauthorized("Not authenticated".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        let uri: Uri = "/api/stream/t1?token=from-query".parse().unwrap();

        assert_eq!(bearer_token(&headers, &uri).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_query_token() {
        let uri: Uri = "/api/stream/t1?t=500&token=abc".parse().unwrap();
        assert_eq!(bearer_token(&HeaderMap::new(), &uri).as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_token() {
        let uri: Uri = "/api/stream/t1".parse().unwrap();
        assert_eq!(bearer_token(&HeaderMap::new(), &uri), None);

        let uri: Uri = "/api/stream/t1?token=".parse().unwrap();
        assert_eq!(bearer_token(&HeaderMap::new(), &uri), None);
    }
}

//! Pseudo-session extraction from bearer tokens.
//!
//! The browser carries the session token either as `Authorization: Bearer`
//! or as an `accessToken` cookie (server-rendered paths only have the
//! cookie). The token body is a base64-encoded JSON claims record; the raw
//! token, not the decoded claims, is what gets forwarded to the backend.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

#[derive(Clone, Debug, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    #[serde(default)]
    pub role: String,
    #[serde(skip)]
    pub token: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// Raw session token from the request: header first, cookie fallback.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    let cookies = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == ACCESS_TOKEN_COOKIE).then(|| value.trim().to_string())
    })
}

/// Decodes the pseudo-session claims out of a token. Tokens that do not
/// decode, or that claim a non-positive user id, yield no user.
pub fn decode_token(token: &str) -> Option<AuthUser> {
    let bytes = STANDARD.decode(token.trim()).ok()?;
    let mut user: AuthUser = serde_json::from_slice(&bytes).ok()?;
    if user.id <= 0 {
        return None;
    }
    user.token = token.trim().to_string();
    Some(user)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Not authenticated" })),
    )
        .into_response()
}

pub fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Admin role required" })),
    )
        .into_response()
}

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        token_from_parts(parts)
            .and_then(|token| decode_token(&token))
            .ok_or_else(unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn token_for(id: i64, role: &str) -> String {
        STANDARD.encode(format!(r#"{{"id":{id},"role":"{role}"}}"#))
    }

    fn parts_with(header_name: header::HeaderName, value: String) -> Parts {
        Request::builder()
            .header(header_name, value)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_decode_roundtrip() {
        let token = token_for(7, "admin");
        let user = decode_token(&token).unwrap();
        assert_eq!(user.id, 7);
        assert!(user.is_admin());
        assert_eq!(user.token, token);
    }

    #[test]
    fn test_garbage_and_bad_claims_yield_no_user() {
        assert!(decode_token("not-base64!").is_none());
        assert!(decode_token(&STANDARD.encode("not json")).is_none());
        assert!(decode_token(&token_for(0, "customer")).is_none());
        assert!(decode_token(&token_for(-3, "admin")).is_none());
    }

    #[test]
    fn test_header_beats_cookie() {
        let token = token_for(7, "customer");
        let parts = parts_with(header::AUTHORIZATION, format!("Bearer {token}"));
        assert_eq!(token_from_parts(&parts), Some(token));
    }

    #[test]
    fn test_cookie_fallback() {
        let token = token_for(7, "customer");
        let parts = parts_with(
            header::COOKIE,
            format!("theme=dark; accessToken={token}; lang=en"),
        );
        assert_eq!(token_from_parts(&parts), Some(token));
    }

    #[test]
    fn test_no_credentials() {
        let parts = Request::builder().body(()).unwrap().into_parts().0;
        assert!(token_from_parts(&parts).is_none());
    }

    #[test]
    fn test_non_admin_role() {
        let user = decode_token(&token_for(7, "customer")).unwrap();
        assert!(!user.is_admin());
    }
}

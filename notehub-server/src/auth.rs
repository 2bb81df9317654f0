//! Session authentication
//!
//! A signed-in browser carries the `session` cookie. Two extractors read it:
//! [`MaybeUser`] for routes open to anonymous visitors and [`CurrentUser`]
//! for routes that require an account. The `loginstate` and `userid`
//! cookies are informational for the front-end and never trusted here.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use notehub_common::models::User;
use tracing::warn;
use uuid::Uuid;

use crate::db::users;
use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_STATE_COOKIE: &str = "loginstate";
pub const USER_ID_COOKIE: &str = "userid";

/// Value of a cookie from the request's `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` values issued on login
pub fn login_cookies(token: &str, user_id: Uuid, lifetime_days: i64) -> [String; 3] {
    let max_age = lifetime_days.max(1) * 24 * 60 * 60;
    [
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, token, max_age
        ),
        format!("{}=true; Path=/; SameSite=Lax; Max-Age={}", LOGIN_STATE_COOKIE, max_age),
        format!("{}={}; Path=/; SameSite=Lax; Max-Age={}", USER_ID_COOKIE, user_id, max_age),
    ]
}

/// `Set-Cookie` values issued on logout
pub fn logout_cookies() -> [String; 3] {
    [
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE),
        format!("{}=false; Path=/; SameSite=Lax", LOGIN_STATE_COOKIE),
        format!("{}=; Path=/; SameSite=Lax; Max-Age=0", USER_ID_COOKIE),
    ]
}

/// The signed-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE).filter(|t| !t.is_empty()) else {
            return Ok(MaybeUser(None));
        };

        match users::user_for_session(&state.db, &token).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                // An unreadable session degrades to anonymous
                warn!("Session lookup failed: {}", e);
                Ok(MaybeUser(None))
            }
        }
    }
}

/// A signed-in user; rejects anonymous requests with 403
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(CurrentUser(user)),
            MaybeUser(None) => Err(ApiError::forbidden()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value_parses_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("loginstate=true; session=abc123; userid=u"),
        );
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "loginstate").as_deref(), Some("true"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_login_cookies_mark_login_state() {
        let id = Uuid::new_v4();
        let cookies = login_cookies("tok", id, 14);
        assert!(cookies[0].starts_with("session=tok;"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[1].starts_with("loginstate=true"));
        assert!(cookies[2].contains(&id.to_string()));
    }

    #[test]
    fn test_logout_cookies_clear_session() {
        let cookies = logout_cookies();
        assert!(cookies[0].contains("Max-Age=0"));
        assert!(cookies[1].starts_with("loginstate=false"));
    }
}

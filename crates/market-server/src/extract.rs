//! Identity extractors
//!
//! An authenticating proxy in front of the server forwards who the caller
//! is in plain headers; they are trusted as-is.
//!
//! ```ignore
//! // 401 without identity headers
//! async fn mine(CurrentUser(identity): CurrentUser) -> String { .. }
//!
//! // 403 unless x-user-role is admin
//! async fn manage(AdminUser(identity): AdminUser) -> String { .. }
//! ```

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use market_core::{Identity, MarketError, Role, UserDirectory, UserId};

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Read the forwarded identity. Missing or malformed id or email is unauthenticated.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, MarketError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let user_id: UserId = header(USER_ID_HEADER)
        .and_then(|v| v.parse().ok())
        .ok_or(MarketError::Unauthorized)?;
    let email = header(USER_EMAIL_HEADER).ok_or(MarketError::Unauthorized)?;
    let role = header(USER_ROLE_HEADER).map(Role::parse).unwrap_or_default();

    Ok(Identity {
        user_id,
        email: email.to_string(),
        role,
    })
}

/// Any authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl Deref for CurrentUser {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = identity_from_headers(&parts.headers)?;
        state.users.upsert(&identity).await?;
        Ok(Self(identity))
    }
}

/// An authenticated caller with the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl Deref for AdminUser {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(MarketError::Forbidden("Forbidden".into()).into());
        }
        Ok(Self(identity))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_identity_from_headers() {
        let identity = identity_from_headers(&headers(&[
            (USER_ID_HEADER, "7"),
            (USER_EMAIL_HEADER, "ops@example.com"),
            (USER_ROLE_HEADER, "admin"),
        ]))
        .unwrap();
        assert_eq!(identity, Identity::admin(UserId(7), "ops@example.com"));

        let plain = identity_from_headers(&headers(&[(USER_ID_HEADER, "7"), (USER_EMAIL_HEADER, "a@b.c")])).unwrap();
        assert_eq!(plain.role, Role::User);
    }

    #[test]
    fn test_missing_or_bad_identity() {
        assert!(matches!(
            identity_from_headers(&headers(&[])),
            Err(MarketError::Unauthorized)
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[(USER_ID_HEADER, "abc"), (USER_EMAIL_HEADER, "a@b.c")])),
            Err(MarketError::Unauthorized)
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[(USER_ID_HEADER, "1")])),
            Err(MarketError::Unauthorized)
        ));
    }
}

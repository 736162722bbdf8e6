use std::net::SocketAddr;

use axum::{
    Extension, RequestPartsExt,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use axum_extra::{TypedHeader, extract::CookieJar, headers::UserAgent};
use portcullis::{Session, SessionToken, User};

use crate::{error::AuthError, types::ConnectionInfo};

impl<S> FromRequestParts<S> for ConnectionInfo
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .extract::<Option<TypedHeader<UserAgent>>>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user agent header"))?
            .map(|ua| ua.to_string());

        let ip = parts
            .extract::<ConnectInfo<SocketAddr>>()
            .await
            .ok()
            .map(|addr| addr.ip().to_string());

        Ok(ConnectionInfo { ip, user_agent })
    }
}

/// The user behind the current session. Only available behind [`require_auth`](crate::require_auth).
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(user): Extension<User> =
            parts.extract().await.map_err(|_| AuthError::Unauthorized)?;

        Ok(AuthUser(user))
    }
}

/// The session resolved by [`require_auth`](crate::require_auth).
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(session): Extension<Session> =
            parts.extract().await.map_err(|_| AuthError::Unauthorized)?;

        Ok(AuthSession(session))
    }
}

/// Session token from the `Authorization: Bearer` header, falling back to the session cookie.
pub struct SessionTokenFromRequest(pub Option<SessionToken>);

impl<S> FromRequestParts<S> for SessionTokenFromRequest
where
    S: Send + Sync,
    crate::CookieConfig: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookies = crate::CookieConfig::from_ref(state);
        let jar = parts
            .extract::<CookieJar>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid cookie header"))?;

        Ok(SessionTokenFromRequest(session_token(
            &parts.headers,
            &jar,
            &cookies.name,
        )))
    }
}

/// Where the visitor was headed before being asked to log in, if they were.
pub struct IntendedDestination(pub Option<String>);

impl<S> FromRequestParts<S> for IntendedDestination
where
    S: Send + Sync,
    crate::CookieConfig: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookies = crate::CookieConfig::from_ref(state);
        let jar = parts
            .extract::<CookieJar>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid cookie header"))?;

        let intended = jar
            .get(&cookies.intended_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty());

        Ok(IntendedDestination(intended))
    }
}

pub(crate) fn session_token(
    headers: &axum::http::HeaderMap,
    jar: &CookieJar,
    cookie_name: &str,
) -> Option<SessionToken> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
    {
        return Some(SessionToken::new(token));
    }

    jar.get(cookie_name)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .map(SessionToken::new)
}

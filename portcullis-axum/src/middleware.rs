use std::sync::Arc;

use axum::{
    extract::{FromRef, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{CookieJar, cookie::Cookie};
use portcullis::Portcullis;
use portcullis_core::RepositoryProvider;

use crate::{error::AuthError, extractors::session_token, types::CookieConfig};

/// Shared state for the auth routes and [`require_auth`].
pub struct AuthState<R: RepositoryProvider> {
    pub portcullis: Arc<Portcullis<R>>,
    pub cookies: CookieConfig,
}

impl<R: RepositoryProvider> AuthState<R> {
    pub fn new(portcullis: Arc<Portcullis<R>>, cookies: CookieConfig) -> Self {
        Self {
            portcullis,
            cookies,
        }
    }
}

impl<R: RepositoryProvider> Clone for AuthState<R> {
    fn clone(&self) -> Self {
        Self {
            portcullis: self.portcullis.clone(),
            cookies: self.cookies.clone(),
        }
    }
}

impl<R: RepositoryProvider> FromRef<AuthState<R>> for CookieConfig {
    fn from_ref(state: &AuthState<R>) -> Self {
        state.cookies.clone()
    }
}

/// Reject requests without a live session.
///
/// On success the [`Session`](portcullis::Session) and its [`User`](portcullis::User) are
/// placed in the request extensions. Unauthenticated `GET` requests also get an
/// intended-destination cookie so the next successful login returns them here.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/reports", get(reports))
///     .layer(axum::middleware::from_fn_with_state(state, require_auth::<SqliteRepositoryProvider>));
/// ```
pub async fn require_auth<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    R: RepositoryProvider,
{
    let Some(token) = session_token(request.headers(), &jar, &state.cookies.name) else {
        return unauthenticated(&state.cookies, jar, &request, AuthError::Unauthorized);
    };

    let session = match state.portcullis.get_session(&token).await {
        Ok(session) => session,
        Err(e) if e.is_unauthenticated() => {
            tracing::debug!(error = %e, "Rejected request with invalid session");
            return unauthenticated(&state.cookies, jar, &request, AuthError::InvalidSession);
        }
        Err(e) => return AuthError::from(e).into_response(),
    };

    match state.portcullis.get_user(&session.user_id).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
        }
        Ok(None) => {
            tracing::warn!(user_id = %session.user_id, "User not found for session");
            return unauthenticated(&state.cookies, jar, &request, AuthError::InvalidSession);
        }
        Err(e) => return AuthError::from(e).into_response(),
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

fn unauthenticated(
    cookies: &CookieConfig,
    jar: CookieJar,
    request: &Request,
    error: AuthError,
) -> Response {
    if request.method() != Method::GET {
        return error.into_response();
    }

    let destination = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let cookie = Cookie::build((cookies.intended_name.clone(), destination))
        .path(cookies.path.clone())
        .http_only(true)
        .secure(cookies.secure)
        .same_site(cookies.same_site.into());

    (jar.add(cookie), error).into_response()
}

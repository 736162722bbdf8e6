use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{CookieJar, cookie::Cookie};
use cookie::CookieBuilder;
use portcullis::{FieldErrors, LoginContext, LoginOutcome, LoginRequest, Portcullis};
use portcullis_core::RepositoryProvider;

use crate::{
    error::{AuthError, Result},
    extractors::{IntendedDestination, SessionTokenFromRequest},
    middleware::AuthState,
    types::*,
};

const VALIDATION_MESSAGE: &str = "The given data was invalid.";

pub fn create_router<R>(portcullis: Arc<Portcullis<R>>, cookie_config: CookieConfig) -> Router
where
    R: RepositoryProvider + 'static,
{
    let state = AuthState::new(portcullis, cookie_config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/session", get(get_session_handler))
        .with_state(state)
}

async fn health_handler<R>(State(state): State<AuthState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state
        .portcullis
        .health_check()
        .await
        .map_err(|e| AuthError::Unavailable(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn login_handler<R>(
    State(state): State<AuthState<R>>,
    connection_info: ConnectionInfo,
    IntendedDestination(intended): IntendedDestination,
    SessionTokenFromRequest(previous): SessionTokenFromRequest,
    jar: CookieJar,
    Json(payload): Json<LoginBody>,
) -> Result<Response>
where
    R: RepositoryProvider,
{
    let mut context = LoginContext::new(connection_info.into());
    if let Some(intended) = intended {
        context = context.with_intended(intended);
    }
    if let Some(previous) = previous {
        context = context.with_previous_session(previous);
    }

    let request = LoginRequest::new(payload.email, payload.password, payload.captcha_token);
    let outcome = state.portcullis.login(request, context).await?;

    Ok(login_response(outcome, &state.cookies, jar))
}

fn login_response(outcome: LoginOutcome, cookies: &CookieConfig, jar: CookieJar) -> Response {
    match outcome {
        LoginOutcome::SessionEstablished {
            redirect_target,
            session,
        } => {
            let cookie = build_cookie(cookies, cookies.name.clone(), session.token.into_inner());
            let jar = jar
                .add(cookie)
                .remove(removal_cookie(cookies, cookies.intended_name.clone()));

            (
                StatusCode::OK,
                jar,
                Json(LoginResponse {
                    redirect_to: redirect_target,
                    user_id: session.user_id,
                }),
            )
                .into_response()
        }
        LoginOutcome::LockedOut {
            message,
            retry_after_seconds,
            old_input,
        } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(LockedOutResponse {
                    error: message,
                    retry_after_seconds,
                    old_input: old_input.into(),
                }),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
            response
        }
        LoginOutcome::AuthFailed {
            message,
            errors,
            old_input,
        } => (
            StatusCode::UNAUTHORIZED,
            Json(AuthFailedResponse {
                error: message,
                errors: form_errors(&errors),
                old_input: old_input.into(),
            }),
        )
            .into_response(),
        LoginOutcome::Invalid { errors } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ValidationResponse {
                error: VALIDATION_MESSAGE.to_string(),
                errors: form_errors(&errors),
            }),
        )
            .into_response(),
    }
}

/// Re-key login errors by the names of the submitted JSON fields.
fn form_errors(errors: &FieldErrors) -> FieldErrors {
    let mut renamed = FieldErrors::new();
    for (field, messages) in errors.iter() {
        let field = match field {
            portcullis_core::validation::IDENTIFIER_FIELD => "email",
            portcullis_core::validation::SECRET_FIELD => "password",
            portcullis_core::validation::CAPTCHA_FIELD => "captcha_token",
            other => other,
        };
        for message in messages {
            renamed.add(field, message.clone());
        }
    }
    renamed
}

async fn get_session_handler<R>(
    State(state): State<AuthState<R>>,
    SessionTokenFromRequest(session_token): SessionTokenFromRequest,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let session_token = session_token.ok_or(AuthError::Unauthorized)?;
    let session = state.portcullis.get_session(&session_token).await?;
    let user = state
        .portcullis
        .get_user(&session.user_id)
        .await?
        .ok_or(AuthError::InvalidSession)?;

    Ok(Json(SessionResponse {
        user,
        created_at: session.created_at,
        expires_at: session.expires_at,
    }))
}

async fn logout_handler<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    SessionTokenFromRequest(session_token): SessionTokenFromRequest,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    if let Some(session_token) = session_token {
        state.portcullis.logout(&session_token).await?;
    }

    let jar = jar.remove(removal_cookie(&state.cookies, state.cookies.name.clone()));

    Ok((
        jar,
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    ))
}

fn build_cookie(cookies: &CookieConfig, name: String, value: String) -> CookieBuilder<'static> {
    Cookie::build((name, value))
        .path(cookies.path.clone())
        .http_only(cookies.http_only)
        .secure(cookies.secure)
        .same_site(cookies.same_site.into())
}

fn removal_cookie(cookies: &CookieConfig, name: String) -> CookieBuilder<'static> {
    Cookie::build((name, String::new())).path(cookies.path.clone())
}

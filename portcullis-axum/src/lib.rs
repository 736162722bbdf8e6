//! # Portcullis Axum Integration
//!
//! Axum routes and middleware for the Portcullis throttled login flow.
//!
//! ## Routes
//!
//! - `POST /login`: JSON `{email, password, captcha_token}`. Answers 200 with a session cookie,
//!   429 with `Retry-After` while the client is locked out, 401 for bad credentials and 422 for
//!   invalid input.
//! - `POST /logout`: revokes the current session and clears the cookie.
//! - `GET /session`: the current session and its user.
//! - `GET /health`: storage health.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use portcullis::{PortcullisBuilder, SqliteRepositoryProvider};
//! use portcullis::captcha::StaticCaptchaVerifier;
//! use portcullis_axum::{AuthState, CookieConfig, require_auth, routes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portcullis = Arc::new(
//!         PortcullisBuilder::new()
//!             .with_sqlite("sqlite://app.db")
//!             .await?
//!             .with_captcha(Arc::new(StaticCaptchaVerifier::accept_all()))
//!             .apply_migrations(true)
//!             .build()
//!             .await?,
//!     );
//!
//!     let auth_routes = routes(portcullis.clone())
//!         .with_cookie_config(CookieConfig::development())
//!         .build();
//!
//!     let state = AuthState::new(portcullis, CookieConfig::development());
//!     let protected = Router::new()
//!         .route("/dashboard", get(dashboard))
//!         .layer(axum::middleware::from_fn_with_state(
//!             state,
//!             require_auth::<SqliteRepositoryProvider>,
//!         ));
//!
//!     let app = Router::new().nest("/auth", auth_routes).merge(protected);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//!
//! async fn dashboard() -> &'static str {
//!     "Welcome back"
//! }
//! ```
//!
//! Serve with `into_make_service_with_connect_info` so the client address reaches the throttle
//! key; without it every client shares the identifier's budget.

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use error::{AuthError, Result};
pub use extractors::{AuthSession, AuthUser, IntendedDestination, SessionTokenFromRequest};
pub use middleware::{AuthState, require_auth};
pub use routes::create_router;
pub use types::{
    AuthFailedResponse, ConnectionInfo, CookieConfig, CookieSameSite, HealthResponse,
    LockedOutResponse, LoginBody, LoginResponse, MessageResponse, OldInputBody, SessionResponse,
    ValidationResponse,
};

use axum::Router;
use portcullis::Portcullis;
use portcullis_core::RepositoryProvider;
use std::sync::Arc;

/// Create the login routes for your Axum application.
///
/// The returned builder converts into a [`Router`] that can be nested at any path.
pub fn routes<R>(portcullis: Arc<Portcullis<R>>) -> AuthRouterBuilder<R>
where
    R: RepositoryProvider + 'static,
{
    AuthRouterBuilder {
        portcullis,
        cookie_config: CookieConfig::default(),
    }
}

/// Builder for configuring authentication routes
pub struct AuthRouterBuilder<R: RepositoryProvider> {
    portcullis: Arc<Portcullis<R>>,
    cookie_config: CookieConfig,
}

impl<R: RepositoryProvider + 'static> AuthRouterBuilder<R> {
    /// Set custom cookie configuration
    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    /// Build the router with the configured options
    pub fn build(self) -> Router {
        create_router(self.portcullis, self.cookie_config)
    }
}

impl<R: RepositoryProvider + 'static> From<AuthRouterBuilder<R>> for Router {
    fn from(builder: AuthRouterBuilder<R>) -> Self {
        builder.build()
    }
}

use axum_extra::extract::cookie::SameSite;
use chrono::{DateTime, Utc};
use portcullis::{ClientInfo, FieldErrors, OldInput, User, UserId};
use serde::{Deserialize, Serialize};

/// The login form. Missing fields deserialize as empty so they surface as validation errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    pub captcha_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub redirect_to: String,
    pub user_id: UserId,
}

/// Submitted values echoed back on a refused login, keyed by form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldInputBody {
    pub email: String,
}

impl From<OldInput> for OldInputBody {
    fn from(old: OldInput) -> Self {
        Self {
            email: old.identifier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedOutResponse {
    pub error: String,
    pub retry_after_seconds: u64,
    pub old_input: OldInputBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFailedResponse {
    pub error: String,
    pub errors: FieldErrors,
    pub old_input: OldInputBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub error: String,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<ConnectionInfo> for ClientInfo {
    fn from(info: ConnectionInfo) -> Self {
        ClientInfo::new(info.ip, info.user_agent)
    }
}

/// Cookie settings for the session cookie and the intended-destination cookie.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    /// Remembers where an unauthenticated visitor was headed
    pub intended_name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::new("session_id")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<CookieSameSite> for SameSite {
    fn from(same_site: CookieSameSite) -> Self {
        match same_site {
            CookieSameSite::Strict => SameSite::Strict,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::None => SameSite::None,
        }
    }
}

impl CookieConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intended_name: "intended_url".to_string(),
            http_only: true,
            secure: true,
            same_site: CookieSameSite::Lax,
            path: "/".to_string(),
        }
    }

    /// Like the default, but without the `Secure` flag so cookies work over plain HTTP.
    pub fn development() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }
}

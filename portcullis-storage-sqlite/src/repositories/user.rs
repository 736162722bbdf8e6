use async_trait::async_trait;
use portcullis_core::{
    Error, User, UserId,
    error::utilities::DatabaseResultExt,
    repositories::UserRepository,
    storage::{AccountAttemptFields, NewUser, StoredCredential},
    throttle::normalize_identifier,
};
use sqlx::SqlitePool;

use super::{from_unix, from_unix_opt};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteUser {
    id: String,
    name: Option<String>,
    email: String,
    login_attempts: i64,
    last_login_attempt: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = Error;

    fn try_from(user: SqliteUser) -> Result<Self, Self::Error> {
        User::builder()
            .id(UserId::new(&user.id))
            .name(user.name)
            .email(user.email)
            .attempts(AccountAttemptFields {
                login_attempts: user.login_attempts,
                last_login_attempt: from_unix_opt(user.last_login_attempt)?,
            })
            .created_at(from_unix(user.created_at)?)
            .updated_at(from_unix(user.updated_at)?)
            .build()
    }
}

const USER_COLUMNS: &str =
    "id, name, email, login_attempts, last_login_attempt, created_at, updated_at";

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(normalize_identifier(&user.email))
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to create user")?;

        row.try_into()
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))
        .bind(normalize_identifier(email))
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(User::try_from).transpose()
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCredential>, Error> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT id, password_hash FROM users WHERE email = ?1 AND password_hash IS NOT NULL",
        )
        .bind(normalize_identifier(email))
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        Ok(row.map(|(id, password_hash)| StoredCredential {
            user_id: UserId::new(&id),
            password_hash,
        }))
    }
}

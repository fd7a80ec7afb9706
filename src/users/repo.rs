use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User};

const EMAIL_CONSTRAINT: &str = "users_email_key";
const EXTERNAL_ID_CONSTRAINT: &str = "users_external_id_key";

const USER_COLUMNS: &str = "id, email, external_id, password_hash, display_name, first_name, \
     last_name, avatar_url, is_subscribed, chat_start_time, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error("a user with this external id already exists")]
    DuplicateExternalId,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistent collection of users, keyed by id, email and external id.
///
/// Every call is a single-record read or write; uniqueness of `email` and
/// `external_id` is enforced by the store itself, not by callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| StoreError::Other(e.into()))?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| StoreError::Other(e.into()))?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        self.find_one("external_id", external_id).await
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, external_id, password_hash, display_name,
                               first_name, last_name, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.external_id)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.avatar_url)
            .fetch_one(&self.db)
            .await
            .map_err(map_insert_error)
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(EMAIL_CONSTRAINT) => return StoreError::DuplicateEmail,
                Some(EXTERNAL_ID_CONSTRAINT) => return StoreError::DuplicateExternalId,
                _ => {}
            }
        }
    }
    StoreError::Other(err.into())
}

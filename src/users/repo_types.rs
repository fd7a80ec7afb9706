use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub external_id: Option<String>,     // Google account id for federated users
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,   // Argon2 hash, local users only, not exposed in JSON
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_subscribed: bool,
    pub chat_start_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_federated(&self) -> bool {
        self.external_id.is_some()
    }
}

/// Fields supplied when inserting a user; the store fills in id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub external_id: Option<String>,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl NewUser {
    pub fn local(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash.into()),
            ..Self::default()
        }
    }

    pub fn federated(email: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }
}

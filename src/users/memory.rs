use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

/// In-process `UserStore` with the same uniqueness rules as the Postgres table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn count_by_external_id(&self, external_id: &str) -> usize {
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.external_id.as_deref() == Some(external_id))
            .count()
    }

    /// Removes a user behind the service's back, as an operator would.
    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        if let Some(external_id) = new.external_id.as_deref() {
            if users
                .values()
                .any(|u| u.external_id.as_deref() == Some(external_id))
            {
                return Err(StoreError::DuplicateExternalId);
            }
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            external_id: new.external_id,
            password_hash: new.password_hash,
            display_name: new.display_name,
            first_name: new.first_name,
            last_name: new.last_name,
            avatar_url: new.avatar_url,
            is_subscribed: false,
            chat_start_time: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_id_and_defaults() {
        let store = MemoryUserStore::new();
        let user = store
            .create(NewUser::local("alice@x.com", "hash"))
            .await
            .unwrap();
        assert!(!user.is_subscribed);
        assert!(user.chat_start_time.is_none());
        assert_eq!(user.created_at, user.updated_at);

        let found = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.email, "alice@x.com");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(NewUser::local("a@x.com", "h1")).await.unwrap();
        let err = store.create(NewUser::local("a@x.com", "h2")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_external_id_but_allows_many_without_one() {
        let store = MemoryUserStore::new();
        store
            .create(NewUser::federated("a@x.com", "g-1"))
            .await
            .unwrap();
        let err = store
            .create(NewUser::federated("b@x.com", "g-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExternalId));

        store.create(NewUser::local("c@x.com", "h")).await.unwrap();
        store.create(NewUser::local("d@x.com", "h")).await.unwrap();
        assert_eq!(store.len().await, 3);
    }
}

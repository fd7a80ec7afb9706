use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    auth::{
        google::ExternalProfile,
        password::{
            hash_password, hash_password_blocking, verify_password, verify_password_blocking,
            PasswordCost,
        },
    },
    config::ProfileCapture,
    error::AppError,
    users::{NewUser, StoreError, User, UserStore},
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

lazy_static! {
    /// Verified against when there is no real hash, so every login costs one Argon2 pass.
    static ref DUMMY_HASH: String =
        hash_password("chatgate-no-such-user", PasswordCost::default()).unwrap_or_default();
}

async fn spend_verify_time(password: &str) {
    let plain = password.to_owned();
    let _ = tokio::task::spawn_blocking(move || verify_password(&plain, &DUMMY_HASH)).await;
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks an email/password pair against the stored hash.
///
/// Every rejection is `InvalidCredentials`, whether the email is unknown, the
/// account has no password (federated only) or the password is wrong.
pub async fn verify_credentials(
    store: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let email = normalize_email(email);

    let Some(user) = store.find_by_email(&email).await? else {
        spend_verify_time(password).await;
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let Some(hash) = user.password_hash.clone() else {
        spend_verify_time(password).await;
        warn!(user_id = %user.id, "login against account without password");
        return Err(AppError::InvalidCredentials);
    };

    let ok = match verify_password_blocking(password.to_owned(), hash).await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, user_id = %user.id, "verify_password failed");
            false
        }
    };

    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

/// Creates a local account. The caller logs the new user in.
pub async fn register_user(
    store: &dyn UserStore,
    email: &str,
    password: &str,
    cost: PasswordCost,
) -> Result<User, AppError> {
    let email = normalize_email(email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::BadRequest("Password too short".into()));
    }

    if store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let hash = hash_password_blocking(password.to_owned(), cost).await?;

    // A concurrent registration can still win between the lookup and the insert
    let user = store.create(NewUser::local(email, hash)).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Finds the user linked to a federated identity, creating one on first sight.
///
/// An existing record is returned untouched. If another request creates the
/// same identity between our lookup and insert, the lookup is retried once
/// and the winner is returned.
pub async fn resolve_or_create(
    store: &dyn UserStore,
    profile: ExternalProfile,
    capture: ProfileCapture,
) -> Result<User, AppError> {
    if let Some(user) = store.find_by_external_id(&profile.external_id).await? {
        return Ok(user);
    }

    let external_id = profile.external_id.clone();
    let email = normalize_email(&profile.email);

    let mut new_user = NewUser::federated(email.clone(), external_id.clone());
    if capture == ProfileCapture::Full {
        new_user.display_name = profile.display_name;
        new_user.first_name = profile.first_name;
        new_user.last_name = profile.last_name;
        new_user.avatar_url = profile.avatar_url;
    }

    match store.create(new_user).await {
        Ok(user) => {
            info!(user_id = %user.id, external_id = %external_id, "federated user created");
            Ok(user)
        }
        Err(StoreError::DuplicateExternalId) => {
            warn!(external_id = %external_id, "lost federated create race; retrying lookup");
            store
                .find_by_external_id(&external_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "external id {external_id} reported duplicate but not found"
                    ))
                })
        }
        Err(StoreError::DuplicateEmail) => {
            // A concurrent callback for the same identity collides on email first
            if let Some(user) = store.find_by_external_id(&external_id).await? {
                warn!(external_id = %external_id, "lost federated create race; using winner");
                return Ok(user);
            }
            // Accounts are never merged across providers
            warn!(email = %email, external_id = %external_id, "email taken by another account");
            Err(AppError::DuplicateEmail)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::cheap_cost;
    use crate::users::memory::MemoryUserStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn bob() -> ExternalProfile {
        ExternalProfile {
            external_id: "g-1".into(),
            email: "bob@x.com".into(),
            display_name: Some("Bob".into()),
            first_name: Some("Bob".into()),
            last_name: Some("Builder".into()),
            avatar_url: Some("https://example.com/bob.png".into()),
        }
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("alice@x.com"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@x"));
        assert!(!is_valid_email("al ice@x.com"));
    }

    #[tokio::test]
    async fn registered_user_can_log_in() {
        let store = MemoryUserStore::new();
        let user = register_user(&store, "Alice@X.com ", "secret123", cheap_cost())
            .await
            .unwrap();
        assert_eq!(user.email, "alice@x.com");
        assert_ne!(user.password_hash.as_deref(), Some("secret123"));
        assert!(user.external_id.is_none());

        let logged_in = verify_credentials(&store, "alice@x.com", "secret123")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let store = MemoryUserStore::new();
        register_user(&store, "alice@x.com", "secret123", cheap_cost())
            .await
            .unwrap();
        let err = verify_credentials(&store, "alice@x.com", "secret124")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() {
        let store = MemoryUserStore::new();
        let err = verify_credentials(&store, "nobody@x.com", "secret123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn federated_account_without_password_is_invalid_credentials() {
        let store = MemoryUserStore::new();
        resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap();
        let err = verify_credentials(&store, "bob@x.com", "anything-at-all")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_first_record_alone() {
        let store = MemoryUserStore::new();
        let first = register_user(&store, "alice@x.com", "secret123", cheap_cost())
            .await
            .unwrap();
        let err = register_user(&store, "alice@x.com", "different-pass", cheap_cost())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let stored = store.find_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password_hash, first.password_hash);
        assert!(verify_credentials(&store, "alice@x.com", "secret123").await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let store = MemoryUserStore::new();
        let err = register_user(&store, "not-an-email", "secret123", cheap_cost())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = register_user(&store, "a@x.com", "short", cheap_cost())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn repeated_federated_login_creates_one_record() {
        let store = MemoryUserStore::new();
        let first = resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap();
        let second = resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_by_external_id("g-1").await, 1);
        assert_eq!(first.first_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn existing_federated_user_is_not_refreshed() {
        let store = MemoryUserStore::new();
        resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap();
        let mut renamed = bob();
        renamed.display_name = Some("Robert".into());
        let user = resolve_or_create(&store, renamed, ProfileCapture::Full)
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn minimal_capture_keeps_only_identity() {
        let store = MemoryUserStore::new();
        let user = resolve_or_create(&store, bob(), ProfileCapture::Minimal)
            .await
            .unwrap();
        assert_eq!(user.external_id.as_deref(), Some("g-1"));
        assert_eq!(user.email, "bob@x.com");
        assert!(user.display_name.is_none());
        assert!(user.avatar_url.is_none());
    }

    #[tokio::test]
    async fn federated_login_with_local_email_is_rejected() {
        let store = MemoryUserStore::new();
        register_user(&store, "bob@x.com", "secret123", cheap_cost())
            .await
            .unwrap();
        let err = resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(store.len().await, 1);
    }

    /// Lets a competing request create the identity right after our first lookup.
    struct RacingStore {
        inner: MemoryUserStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .create(NewUser::federated("bob@x.com", external_id))
                    .await?;
                return Ok(None);
            }
            self.inner.find_by_external_id(external_id).await
        }

        async fn create(&self, user: NewUser) -> Result<User, StoreError> {
            self.inner.create(user).await
        }
    }

    #[tokio::test]
    async fn lost_create_race_resolves_to_the_winner() {
        let store = RacingStore {
            inner: MemoryUserStore::new(),
            raced: AtomicBool::new(false),
        };
        let user = resolve_or_create(&store, bob(), ProfileCapture::Full)
            .await
            .unwrap();
        assert_eq!(user.external_id.as_deref(), Some("g-1"));
        assert_eq!(user.email, "bob@x.com");
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn lost_create_race_on_external_id_only_resolves_to_the_winner() {
        let store = RacingStore {
            inner: MemoryUserStore::new(),
            raced: AtomicBool::new(false),
        };
        let mut profile = bob();
        profile.email = "bob+other@x.com".into();
        let user = resolve_or_create(&store, profile, ProfileCapture::Full)
            .await
            .unwrap();
        assert_eq!(user.external_id.as_deref(), Some("g-1"));
        assert_eq!(user.email, "bob@x.com");
        assert_eq!(store.inner.count_by_external_id("g-1").await, 1);
    }

    #[test]
    fn dummy_hash_never_matches() {
        assert!(DUMMY_HASH.starts_with("$argon2id$"));
        assert!(!verify_password("chatgate-no-such-user-x", &DUMMY_HASH).unwrap());
    }
}

//! Server-side session state: anonymous until [`establish`], back to anonymous on [`end`].
//!
//! Only the user id is kept in the session. Every request re-reads the user
//! from the store, so profile changes and deletions are seen immediately.

use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::google::AuthorizationRequest;

pub const SESSION_COOKIE_NAME: &str = "chatgate.sid";

pub const SESSION_USER_ID_KEY: &str = "user_id";
const PENDING_OAUTH_KEY: &str = "oauth_pending";

/// Marks the session as belonging to `user_id`.
///
/// The id is cycled first so a session id handed out while anonymous can't be
/// reused after login.
pub async fn establish(session: &Session, user_id: Uuid) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(SESSION_USER_ID_KEY, user_id).await?;
    debug!(%user_id, "session established");
    Ok(())
}

/// Unreadable or missing state reads as anonymous.
pub async fn current_user_id(session: &Session) -> Option<Uuid> {
    match session.get::<Uuid>(SESSION_USER_ID_KEY).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "could not read session; treating as anonymous");
            None
        }
    }
}

/// Destroys server-side state and expires the cookie. Safe on anonymous sessions.
pub async fn end(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

pub async fn remember_authorization(
    session: &Session,
    request: &AuthorizationRequest,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(PENDING_OAUTH_KEY, request).await
}

/// Removes and returns the pending authorization, so a callback can be completed once.
pub async fn take_authorization(
    session: &Session,
) -> Result<Option<AuthorizationRequest>, tower_sessions::session::Error> {
    session.remove::<AuthorizationRequest>(PENDING_OAUTH_KEY).await
}

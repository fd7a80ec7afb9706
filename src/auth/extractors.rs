use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use tracing::warn;

use super::session;
use crate::{error::AppError, state::AppState, users::User};

/// The authenticated user, freshly read from the store. Rejects with 401 otherwise.
pub struct CurrentUser(pub User);

/// The authenticated user if there is one. Never rejects.
pub struct MaybeUser(pub Option<User>);

async fn resolve_user(parts: &Parts, state: &AppState) -> Option<User> {
    let session = parts.extensions.get::<Session>()?;
    let user_id = session::current_user_id(session).await?;

    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            warn!(%user_id, "session refers to a missing user; treating as anonymous");
            None
        }
        Err(e) => {
            warn!(error = %e, %user_id, "session user lookup failed; treating as anonymous");
            None
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state)
            .await
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_user(parts, state).await))
    }
}

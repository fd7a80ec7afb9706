use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod google;
pub mod handlers;
pub mod password;
pub mod services;
pub mod session;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::google_routes())
        .merge(handlers::profile_routes())
}

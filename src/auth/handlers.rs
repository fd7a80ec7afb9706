use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    routing::{get, post},
    Json, Router,
};
use tower_sessions::Session;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, OAuthCallbackQuery, PublicUser, RegisterRequest},
        extractors::{CurrentUser, MaybeUser},
        services::{register_user, resolve_or_create, verify_credentials},
        session,
    },
    error::AppError,
    state::AppState,
    users::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
}

pub fn google_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(profile))
}

pub async fn landing(MaybeUser(user): MaybeUser) -> Html<String> {
    match user {
        Some(user) => Html(format!(
            "<h1>Home</h1><p>Signed in as {}</p><a href=\"/profile\">Profile</a> <a href=\"/logout\">Logout</a>",
            escape_html(user.display_name.as_deref().unwrap_or(&user.email))
        )),
        None => Html("<h1>Home</h1><a href=\"/auth/google\">Login with Google</a>".to_string()),
    }
}

#[instrument(skip(state, session, payload))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let user = register_user(
        state.users.as_ref(),
        &payload.email,
        &payload.password,
        state.config.password,
    )
    .await?;

    session::establish(&session, user.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered and logged in successfully",
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, session, payload))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = verify_credentials(state.users.as_ref(), &payload.email, &payload.password).await?;

    session::establish(&session, user.id).await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        message: "Logged in successfully",
        user: user.into(),
    }))
}

#[instrument(skip_all)]
pub async fn profile(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip_all)]
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    let user_id = session::current_user_id(&session).await;
    // The old cookie would stay valid if the flush failed
    session::end(&session).await?;
    if let Some(user_id) = user_id {
        info!(%user_id, "user logged out");
    }
    Ok(Redirect::to("/"))
}

#[instrument(skip_all)]
pub async fn google_start(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect, AppError> {
    let request = state.provider.authorize_url();
    session::remember_authorization(&session, &request).await?;
    Ok(Redirect::to(&request.url))
}

/// Finishes federated login. Identity resolution and session setup complete
/// before the client is redirected anywhere.
#[instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    let redirects = &state.config.redirects;
    match complete_google_login(&state, &session, query).await {
        Ok(user) => {
            info!(user_id = %user.id, "google login succeeded");
            Redirect::to(&redirects.oauth_success)
        }
        Err(e) => {
            if e.status().is_server_error() {
                error!(error = %e, "google login failed");
            } else {
                warn!(error = %e, "google login rejected");
            }
            Redirect::to(&redirects.oauth_failure)
        }
    }
}

async fn complete_google_login(
    state: &AppState,
    session: &Session,
    query: OAuthCallbackQuery,
) -> Result<User, AppError> {
    let pending = session::take_authorization(session).await?;

    if let Some(err) = query.error {
        return Err(AppError::UpstreamProvider(format!("provider returned {err}")));
    }
    let pending = pending
        .ok_or_else(|| AppError::UpstreamProvider("no authorization in progress".into()))?;
    let code = query
        .code
        .ok_or_else(|| AppError::UpstreamProvider("callback missing code".into()))?;
    if query.state.as_deref() != Some(pending.csrf_state.as_str()) {
        return Err(AppError::UpstreamProvider("oauth state mismatch".into()));
    }

    let profile = state.provider.exchange(&code, &pending.pkce_verifier).await?;
    let user = resolve_or_create(state.users.as_ref(), profile, state.config.profile_capture).await?;
    session::establish(session, user.id).await?;
    Ok(user)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

use std::str::FromStr;

use anyhow::Context;
use axum::http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::password::PasswordCost;

/// Signed cookies need at least this much key material.
pub const MIN_SESSION_SECRET_LEN: usize = 64;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// How much of the federated profile is kept when a new user is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileCapture {
    /// External id and email only.
    Minimal,
    /// Also display name, given/family name and avatar.
    #[default]
    Full,
}

impl FromStr for ProfileCapture {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "full" => Ok(Self::Full),
            other => anyhow::bail!("unknown profile capture mode {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: SecretString,
    pub ttl_minutes: i64,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub oauth_success: String,
    pub oauth_failure: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub session: SessionConfig,
    pub google: GoogleConfig,
    pub redirects: RedirectConfig,
    pub profile_capture: ProfileCapture,
    pub password: PasswordCost,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_source<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| get(key).with_context(|| format!("{key} is not set"));
        let parsed = |key: &str| -> anyhow::Result<Option<i64>> {
            get(key)
                .map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer")))
                .transpose()
        };

        let secret = required("SESSION_SECRET")?;
        anyhow::ensure!(
            secret.len() >= MIN_SESSION_SECRET_LEN,
            "SESSION_SECRET must be at least {MIN_SESSION_SECRET_LEN} bytes"
        );
        let session = SessionConfig {
            secret: SecretString::from(secret),
            ttl_minutes: parsed("SESSION_TTL_MINUTES")?.unwrap_or(30),
            secure: get("SESSION_SECURE")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
        };
        anyhow::ensure!(session.ttl_minutes > 0, "SESSION_TTL_MINUTES must be positive");

        let google = GoogleConfig {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: SecretString::from(required("GOOGLE_CLIENT_SECRET")?),
            callback_url: get("GOOGLE_CALLBACK_URL")
                .unwrap_or_else(|| "http://localhost:3000/auth/google/callback".into()),
            auth_url: get("GOOGLE_AUTH_URL").unwrap_or_else(|| GOOGLE_AUTH_URL.into()),
            token_url: get("GOOGLE_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.into()),
            userinfo_url: get("GOOGLE_USERINFO_URL").unwrap_or_else(|| GOOGLE_USERINFO_URL.into()),
        };

        let redirects = RedirectConfig {
            oauth_success: get("OAUTH_SUCCESS_REDIRECT").unwrap_or_else(|| "/profile".into()),
            oauth_failure: get("OAUTH_FAILURE_REDIRECT").unwrap_or_else(|| "/".into()),
        };

        let cors_origins: Vec<String> = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        for origin in &cors_origins {
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CORS origin {origin:?}"))?;
        }

        let port = get("APP_PORT")
            .or_else(|| get("PORT"))
            .map(|v| v.parse::<u16>().context("APP_PORT must be a port number"))
            .transpose()?
            .unwrap_or(3000);

        let profile_capture = get("PROFILE_CAPTURE")
            .map(|v| v.parse::<ProfileCapture>())
            .transpose()?
            .unwrap_or_default();

        let defaults = PasswordCost::default();
        let cost = |key: &str, fallback: u32| -> anyhow::Result<u32> {
            get(key)
                .map(|v| v.parse::<u32>().with_context(|| format!("{key} must be a positive integer")))
                .transpose()
                .map(|v| v.unwrap_or(fallback))
        };
        let password = PasswordCost {
            memory_kib: cost("ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: cost("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: cost("ARGON2_PARALLELISM", defaults.parallelism)?,
        };
        password.argon2()?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
            session,
            google,
            redirects,
            profile_capture,
            password,
        })
    }
}

impl SessionConfig {
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}

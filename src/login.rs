use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::Json;
use crate::mailer::generate_reset_code;
use crate::models::is_unique_violation;
use crate::models::user::{PrivateUser, User};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]{3,30}$").unwrap();
}

/// The authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    pub user: CurrentUser,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// In-memory session table keyed by the opaque cookie value.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: ttl.min(MAX_SESSION_TTL),
        }
    }

    /// Create a new session and return its id.
    pub fn create(&self, user: CurrentUser) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();

        let mut sessions = self.write();
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            session_id.clone(),
            Session {
                user,
                expires_at: now + self.ttl,
            },
        );

        session_id
    }

    /// The session's user, if the session exists and has not expired.
    pub fn validate(&self, session_id: &str) -> Option<CurrentUser> {
        let sessions = self.read();

        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.write().remove(session_id);
    }

    /// Drop every session of one user, e.g. after a password reset.
    pub fn remove_user(&self, user_id: i64) {
        self.write().retain(|_, session| session.user.id != user_id);
    }

    // A poisoned lock only means another request panicked mid-update; the map is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub reset_code: String,
    pub new_password: String,
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(AppError::validation(
            "Username must be 3-30 letters, digits or underscores",
        ))
    }
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Invalid email address"))
    }
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 8 {
        return Err(AppError::validation(
            "Password must be at least 8 characters",
        ));
    }
    Ok(())
}

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))
}

/// Check a plaintext password against a stored Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn start_session(state: &AppState, jar: CookieJar, user: &User) -> CookieJar {
    let session_id = state.sessions.create(CurrentUser {
        id: user.id,
        username: user.username.clone(),
    });
    jar.add(session_cookie(session_id))
}

/// Register a new user and log them in.
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<PrivateUser>)> {
    let username = req.username.trim();
    let email = req.email.trim();

    validate_username(username)?;
    validate_email(email)?;
    validate_password(&req.password)?;

    if User::find_by_username(&state.pool, username).await?.is_some() {
        return Err(AppError::conflict("Username already exists"));
    }
    if User::find_by_email(&state.pool, email).await?.is_some() {
        return Err(AppError::conflict("Email address is already registered"));
    }

    let password_hash = hash_password(&req.password)?;
    let user = match User::create(&state.pool, username, email, &password_hash).await {
        Ok(user) => user,
        // lost a race with a concurrent registration
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::conflict("Username or email already registered"));
        }
        Err(e) => return Err(e.into()),
    };

    info!("Registered user {} (id {})", user.username, user.id);
    let jar = start_session(&state, jar, &user);
    Ok((StatusCode::CREATED, jar, Json(user.into())))
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<PrivateUser>)> {
    let user = User::find_by_username(&state.pool, credentials.username.trim()).await?;

    let Some(user) = user else {
        warn!("Login failed for unknown user {:?}", credentials.username);
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(&credentials.password, &user.password_hash)? {
        warn!("Login failed for {}", user.username);
        return Err(AppError::InvalidCredentials);
    }

    info!("User {} logged in", user.username);
    let jar = start_session(&state, jar, &user);
    Ok((jar, Json(user.into())))
}

/// Forget the session server-side and expire the cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(user) = state.sessions.validate(cookie.value()) {
            info!("User {} logged out", user.username);
        }
        state.sessions.remove(cookie.value());
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (StatusCode::NO_CONTENT, jar)
}

/// Change the password of the logged-in user.
pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<PasswordChangeRequest>,
) -> AppResult<StatusCode> {
    let user = User::find_by_id(&state.pool, current.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !verify_password(&req.old_password, &user.password_hash)? {
        return Err(AppError::validation("Invalid old password"));
    }
    if req.new_password != req.confirm_password {
        return Err(AppError::validation("New passwords don't match"));
    }
    validate_password(&req.new_password)?;

    let hash = hash_password(&req.new_password)?;
    User::update_password(&state.pool, user.id, &hash).await?;

    info!("User {} changed their password", user.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Issue a reset code. Answers 202 whether or not the address is known.
pub async fn handle_forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> AppResult<StatusCode> {
    let email = req.email.trim();

    let Some(user) = User::find_by_email(&state.pool, email).await? else {
        debug!("Password reset requested for unknown address");
        return Ok(StatusCode::ACCEPTED);
    };

    let reset_code = generate_reset_code();
    let expires = Utc::now()
        + chrono::Duration::from_std(state.config.reset_code_ttl)
            .map_err(|e| AppError::Internal(e.to_string()))?;
    User::set_reset_code(&state.pool, user.id, &reset_code, expires).await?;

    let valid_minutes = state.config.reset_code_ttl.as_secs() / 60;
    match state.mailer.clone() {
        Some(mailer) => {
            let to = user.email.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = mailer.send_password_reset(&to, &reset_code, valid_minutes) {
                    error!("Failed to send password reset email: {e}");
                }
            });
        }
        None => warn!(
            "No mailer configured; reset code for {} is {}",
            user.username, reset_code
        ),
    }

    Ok(StatusCode::ACCEPTED)
}

pub async fn handle_reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirm>,
) -> AppResult<StatusCode> {
    let invalid = || AppError::validation("Invalid or expired reset code");

    let user = User::find_by_email(&state.pool, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    let (Some(stored_code), Some(expires)) = (&user.reset_code, user.reset_code_expires) else {
        return Err(invalid());
    };
    if expires < Utc::now() || !stored_code.eq_ignore_ascii_case(req.reset_code.trim()) {
        return Err(invalid());
    }
    validate_password(&req.new_password)?;

    let hash = hash_password(&req.new_password)?;
    User::update_password(&state.pool, user.id, &hash).await?;
    state.sessions.remove_user(user.id);

    info!("Password reset for {}", user.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Authentication middleware
///
/// Resolves the `session` cookie and puts the [`CurrentUser`] into the
/// request extensions; anything else is rejected with 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.validate(cookie.value()));

    match user {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => AppError::Unauthorized.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "alice".to_string(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
    }

    #[test]
    fn email_and_password_rules() {
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email("@b.c").is_err());
        assert!(validate_email("nobody").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn sessions_validate_until_removed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(alice());

        assert_eq!(store.validate(&id).map(|u| u.id), Some(1));
        store.remove(&id);
        assert!(store.validate(&id).is_none());
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create(alice());
        assert!(store.validate(&id).is_none());
    }

    #[test]
    fn huge_ttl_is_clamped() {
        let store = SessionStore::new(Duration::MAX);
        let id = store.create(alice());
        assert_eq!(store.validate(&id).map(|u| u.id), Some(1));
    }

    #[test]
    fn remove_user_drops_all_their_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));
        let first = store.create(alice());
        let second = store.create(alice());
        store.remove_user(1);
        assert!(store.validate(&first).is_none());
        assert!(store.validate(&second).is_none());
    }
}

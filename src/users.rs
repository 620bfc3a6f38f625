use axum::{Extension, extract::State, http::StatusCode};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path, Query};
use crate::login::CurrentUser;
use crate::models::follow::Follow;
use crate::models::user::{PrivateUser, ProfileUpdate, User, UserProfile, UserSummary};

const SEARCH_LIMIT: i64 = 10;
const DISPLAY_NAME_MAX: usize = 60;
const BIO_MAX: usize = 280;
const URL_MAX: usize = 2048;

/// Partial profile update; an explicit `null` clears the field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub avatar_url: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct FollowState {
    pub username: String,
    pub following: bool,
    pub follower_count: i64,
}

/// Trim `value`, map blank to `None` and enforce a length limit.
pub fn clean_text(value: Option<String>, field: &str, max: usize) -> AppResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Like [`clean_text`] but the value must also be an http(s) URL.
pub fn clean_url(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    let cleaned = clean_text(value, field, URL_MAX)?;
    if let Some(url) = &cleaned {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(AppError::validation(format!(
                "{field} must be an http(s) URL"
            )));
        }
    }
    Ok(cleaned)
}

async fn find_user(state: &AppState, username: &str) -> AppResult<User> {
    User::find_by_username(&state.pool, username)
        .await?
        .ok_or(AppError::NotFound("User"))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<PrivateUser>> {
    let user = User::find_by_id(&state.pool, current.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<PrivateUser>> {
    let user = User::find_by_id(&state.pool, current.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let update = ProfileUpdate {
        display_name: match req.display_name {
            Some(value) => clean_text(value, "display_name", DISPLAY_NAME_MAX)?,
            None => user.display_name,
        },
        bio: match req.bio {
            Some(value) => clean_text(value, "bio", BIO_MAX)?,
            None => user.bio,
        },
        avatar_url: match req.avatar_url {
            Some(value) => clean_url(value, "avatar_url")?,
            None => user.avatar_url,
        },
    };

    let user = User::update_profile(&state.pool, current.id, &update).await?;
    debug!("User {} updated their profile", user.username);
    Ok(Json(user.into()))
}

/// Username prefix search for mention autocomplete.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let prefix = query.q.trim().trim_start_matches('@');
    if prefix.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let users = User::search_prefix(&state.pool, prefix, SEARCH_LIMIT).await?;
    Ok(Json(users))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    User::profile(&state.pool, current.id, &username)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("User"))
}

pub async fn follow(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> AppResult<(StatusCode, Json<FollowState>)> {
    let target = find_user(&state, &username).await?;
    if target.id == current.id {
        return Err(AppError::validation("You cannot follow yourself"));
    }

    if !Follow::create(&state.pool, current.id, target.id).await? {
        return Err(AppError::conflict(format!(
            "Already following {}",
            target.username
        )));
    }

    debug!("{} now follows {}", current.username, target.username);
    let result = follow_state(&state, current.id, target).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn unfollow(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> AppResult<Json<FollowState>> {
    let target = find_user(&state, &username).await?;

    if !Follow::delete(&state.pool, current.id, target.id).await? {
        return Err(AppError::NotFound("Follow"));
    }

    debug!("{} unfollowed {}", current.username, target.username);
    Ok(Json(follow_state(&state, current.id, target).await?))
}

async fn follow_state(state: &AppState, viewer_id: i64, target: User) -> AppResult<FollowState> {
    let profile = User::profile(&state.pool, viewer_id, &target.username)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(FollowState {
        username: profile.username,
        following: profile.is_following,
        follower_count: profile.follower_count,
    })
}

pub async fn followers(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let user = find_user(&state, &username).await?;
    Ok(Json(Follow::followers(&state.pool, user.id).await?))
}

pub async fn following(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let user = find_user(&state, &username).await?;
    Ok(Json(Follow::following(&state.pool, user.id).await?))
}

use axum::{Extension, body::Bytes, extract::State, http::StatusCode};
use chrono::{NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path, Query};
use crate::login::CurrentUser;
use crate::mentions::extract_mentions;
use crate::models::event::{Event, EventStatus, EventView, NewEvent};
use crate::models::follow::Follow;
use crate::models::is_unique_violation;
use crate::models::social::{Like, LikeState, Share, ShareRecord};
use crate::models::user::User;
use crate::users::{clean_text, clean_url};
use crate::visibility::{self, EventAccess};

const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 5000;
const LOCATION_MAX: usize = 200;
const NOTE_MAX: usize = 280;
const FEED_DEFAULT_LIMIT: i64 = 20;
const FEED_MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<EventStatus>,
    pub event_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

/// Partial update. Nullable fields distinguish "absent" from an explicit `null`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<EventStatus>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub event_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub image_url: Option<Option<String>>,
    /// The version the client last saw.
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub status: EventStatus,
    pub event_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub recipient: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub share_id: i64,
    pub event_id: i64,
    pub recipient: String,
    pub share_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CopyRequest {
    pub status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub before: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub events: Vec<EventView>,
    /// Pass as `before` to fetch the next page; absent on the last page.
    pub next_before: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InboxItem {
    pub share: ShareRecord,
    pub event: EventView,
}

pub fn clean_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title cannot be empty"));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(AppError::validation(format!(
            "Title must be at most {TITLE_MAX} characters"
        )));
    }
    Ok(title.to_string())
}

/// `requested` must contain exactly the ids of `current`, each once.
pub fn check_permutation(current: &[i64], requested: &[i64]) -> bool {
    if current.len() != requested.len() {
        return false;
    }
    let mut a = current.to_vec();
    let mut b = requested.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    b.dedup();
    a == b
}

/// The copy body is optional, but a body that is present must be valid.
fn parse_copy_request(body: &[u8]) -> AppResult<CopyRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CopyRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("Invalid copy request: {e}")))
}

fn feed_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(FEED_DEFAULT_LIMIT)
        .clamp(1, FEED_MAX_LIMIT)
}

/// Load an event the viewer is allowed to see; hidden events look missing.
async fn load_visible(
    state: &AppState,
    viewer: &CurrentUser,
    id: i64,
) -> AppResult<(Event, EventAccess)> {
    visibility::visible_event(&state.pool, viewer.id, id)
        .await?
        .ok_or(AppError::NotFound("Event"))
}

async fn load_owned(state: &AppState, viewer: &CurrentUser, id: i64) -> AppResult<Event> {
    let (event, access) = load_visible(state, viewer, id).await?;
    if access != EventAccess::Owner {
        return Err(AppError::forbidden("Only the owner can change this event"));
    }
    Ok(event)
}

async fn view_of(state: &AppState, viewer_id: i64, id: i64) -> AppResult<EventView> {
    Event::view(&state.pool, viewer_id, id)
        .await?
        .ok_or(AppError::NotFound("Event"))
}

async fn version_conflict(state: &AppState, viewer_id: i64, id: i64) -> AppError {
    match view_of(state, viewer_id, id).await {
        Ok(current) => AppError::VersionConflict(Box::new(current)),
        Err(e) => e,
    }
}

/// Recompute who an event mentions from its description.
async fn sync_mentions(conn: &mut SqliteConnection, event: &Event) -> Result<(), sqlx::Error> {
    let names = extract_mentions(event.description.as_deref().unwrap_or_default());
    let ids: Vec<i64> = User::ids_for_usernames(conn, &names)
        .await?
        .into_iter()
        .filter(|id| *id != event.user_id)
        .collect();
    Event::replace_mentions(conn, event.id, &ids).await
}

async fn list_board(
    state: &AppState,
    viewer_id: i64,
    owner_id: i64,
    status: Option<EventStatus>,
) -> AppResult<Vec<EventView>> {
    let today = Utc::now().date_naive();
    let mut tx = state.pool.begin().await?;
    let moved = Event::roll_over_elapsed(&mut *tx, owner_id, today).await?;
    tx.commit().await?;
    if moved > 0 {
        debug!("Moved {moved} elapsed events of user {owner_id} to past");
    }

    Ok(Event::board(&state.pool, viewer_id, owner_id, status).await?)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<EventView>)> {
    let data = NewEvent {
        title: clean_title(&req.title)?,
        description: clean_text(req.description, "description", DESCRIPTION_MAX)?,
        status: req.status.unwrap_or_default(),
        event_date: req.event_date,
        location: clean_text(req.location, "location", LOCATION_MAX)?,
        image_url: clean_url(req.image_url, "image_url")?,
        shared_from_user_id: None,
        original_event_id: None,
    };

    let mut tx = state.pool.begin().await?;
    let event = Event::create(&mut *tx, user.id, &data).await?;
    sync_mentions(&mut *tx, &event).await?;
    tx.commit().await?;

    debug!("{} created event {}", user.username, event.id);
    let view = view_of(&state, user.id, event.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<EventView>> {
    let (event, _) = load_visible(&state, &user, id).await?;
    Ok(Json(view_of(&state, user.id, event.id).await?))
}

/// Apply a partial update with optimistic concurrency.
///
/// A stale `expected_version` (or a concurrent write between read and save)
/// yields 409 carrying the current event so the client can reconcile.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEventRequest>,
) -> AppResult<Json<EventView>> {
    let current = load_owned(&state, &user, id).await?;

    let expected = req.expected_version.unwrap_or(current.version);
    if expected != current.version {
        return Err(version_conflict(&state, user.id, id).await);
    }

    let mut next = current.clone();
    let mut changed = false;
    let mut description_changed = false;

    if let Some(title) = req.title {
        next.title = clean_title(&title)?;
        changed |= next.title != current.title;
    }
    if let Some(description) = req.description {
        next.description = clean_text(description, "description", DESCRIPTION_MAX)?;
        description_changed = next.description != current.description;
        changed |= description_changed;
    }
    if let Some(event_date) = req.event_date {
        next.event_date = event_date;
        changed |= next.event_date != current.event_date;
    }
    if let Some(location) = req.location {
        next.location = clean_text(location, "location", LOCATION_MAX)?;
        changed |= next.location != current.location;
    }
    if let Some(image_url) = req.image_url {
        next.image_url = clean_url(image_url, "image_url")?;
        changed |= next.image_url != current.image_url;
    }
    let status_changed = req.status.is_some_and(|status| status != current.status);

    if !changed && !status_changed {
        return Ok(Json(view_of(&state, user.id, id).await?));
    }

    let mut tx = state.pool.begin().await?;
    if let Some(status) = req.status.filter(|_| status_changed) {
        next.status = status;
        next.position = Event::next_position(&mut *tx, user.id, status).await?;
    }

    let Some(saved) = Event::save(&mut *tx, &next, expected).await? else {
        tx.rollback().await?;
        return Err(version_conflict(&state, user.id, id).await);
    };
    if description_changed {
        sync_mentions(&mut *tx, &saved).await?;
    }
    tx.commit().await?;

    debug!(
        "{} updated event {} to version {}",
        user.username, saved.id, saved.version
    );
    Ok(Json(view_of(&state, user.id, id).await?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let event = load_owned(&state, &user, id).await?;
    Event::delete(&state.pool, event.id).await?;

    debug!("{} deleted event {}", user.username, event.id);
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's own board.
pub async fn board(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<BoardQuery>,
) -> AppResult<Json<Vec<EventView>>> {
    Ok(Json(list_board(&state, user.id, user.id, query.status).await?))
}

/// Someone else's board; only their followers may look.
pub async fn user_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(username): Path<String>,
    Query(query): Query<BoardQuery>,
) -> AppResult<Json<Vec<EventView>>> {
    let owner = User::find_by_username(&state.pool, &username)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !visibility::can_view_board(&state.pool, user.id, owner.id).await? {
        return Err(AppError::forbidden(format!(
            "Follow {} to see their events",
            owner.username
        )));
    }

    Ok(Json(list_board(&state, user.id, owner.id, query.status).await?))
}

/// Rewrite the order of one status column after a drag.
pub async fn reorder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ReorderRequest>,
) -> AppResult<Json<Vec<EventView>>> {
    let mut tx = state.pool.begin().await?;
    let current = Event::column_ids(&mut *tx, user.id, req.status).await?;
    if !check_permutation(&current, &req.event_ids) {
        return Err(AppError::validation(format!(
            "event_ids must list every {} event exactly once",
            req.status.as_str()
        )));
    }
    Event::set_positions(&mut *tx, &req.event_ids).await?;
    tx.commit().await?;

    debug!(
        "{} reordered {} events in {}",
        user.username,
        req.event_ids.len(),
        req.status.as_str()
    );
    Ok(Json(
        Event::board(&state.pool, user.id, user.id, Some(req.status)).await?,
    ))
}

pub async fn like(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<LikeState>> {
    let (event, _) = load_visible(&state, &user, id).await?;
    Like::create(&state.pool, event.id, user.id).await?;
    Ok(Json(Like::state(&state.pool, event.id, user.id).await?))
}

pub async fn unlike(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<LikeState>> {
    let (event, _) = load_visible(&state, &user, id).await?;
    Like::delete(&state.pool, event.id, user.id).await?;
    Ok(Json(Like::state(&state.pool, event.id, user.id).await?))
}

/// Push an event into the inbox of one of the sharer's followers.
pub async fn share(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ShareRequest>,
) -> AppResult<(StatusCode, Json<ShareResponse>)> {
    let (event, _) = load_visible(&state, &user, id).await?;

    let recipient = User::find_by_username(&state.pool, req.recipient.trim().trim_start_matches('@'))
        .await?
        .ok_or(AppError::NotFound("User"))?;
    if recipient.id == user.id {
        return Err(AppError::validation("You cannot share an event with yourself"));
    }
    if recipient.id == event.user_id {
        return Err(AppError::validation(format!(
            "{} owns this event",
            recipient.username
        )));
    }
    if !Follow::exists(&state.pool, recipient.id, user.id).await? {
        return Err(AppError::forbidden(
            "You can only share with users who follow you",
        ));
    }

    let note = clean_text(req.note, "note", NOTE_MAX)?;
    let Some(share_id) =
        Share::create(&state.pool, event.id, user.id, recipient.id, note.as_deref()).await?
    else {
        return Err(AppError::conflict(format!(
            "Event already shared with {}",
            recipient.username
        )));
    };

    debug!(
        "{} shared event {} with {}",
        user.username, event.id, recipient.username
    );
    let share_count = Share::count_for_event(&state.pool, event.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ShareResponse {
            share_id,
            event_id: event.id,
            recipient: recipient.username,
            share_count,
        }),
    ))
}

/// Copy a visible event onto the caller's board.
///
/// The copy remembers whose event it came from and the root of the copy
/// chain, so a copy of a copy still points at the first original.
pub async fn copy(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<EventView>)> {
    let req = parse_copy_request(&body)?;
    let (source, _) = load_visible(&state, &user, id).await?;

    if source.user_id == user.id {
        return Err(AppError::validation("You cannot copy your own event"));
    }

    let root_id = source.original_event_id.unwrap_or(source.id);
    if root_id != source.id {
        let root = Event::find_by_id(&state.pool, root_id).await?;
        if root.is_some_and(|root| root.user_id == user.id) {
            return Err(AppError::validation(
                "This event is a copy of one of your own",
            ));
        }
    }
    if Event::find_copy(&state.pool, user.id, root_id).await?.is_some() {
        return Err(AppError::conflict("You already copied this event"));
    }

    let data = NewEvent {
        title: source.title.clone(),
        description: source.description.clone(),
        status: req.status.unwrap_or_default(),
        event_date: source.event_date,
        location: source.location.clone(),
        image_url: source.image_url.clone(),
        shared_from_user_id: Some(source.user_id),
        original_event_id: Some(root_id),
    };

    let mut tx = state.pool.begin().await?;
    let copied = match Event::create(&mut *tx, user.id, &data).await {
        Ok(event) => event,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::conflict("You already copied this event"));
        }
        Err(e) => return Err(e.into()),
    };
    sync_mentions(&mut *tx, &copied).await?;
    tx.commit().await?;

    info!(
        "{} copied event {} (root {}) as {}",
        user.username, source.id, root_id, copied.id
    );
    let view = view_of(&state, user.id, copied.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Events from everyone the caller follows, newest first.
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<FeedPage>> {
    let limit = feed_limit(query.limit);
    let events = Event::feed(&state.pool, user.id, query.before, limit).await?;

    let next_before = if events.len() as i64 == limit {
        events.last().map(|event| event.id)
    } else {
        None
    };
    Ok(Json(FeedPage {
        events,
        next_before,
    }))
}

/// Events other users shared with the caller, newest share first.
pub async fn inbox(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<InboxItem>>> {
    let shares = Share::inbox(&state.pool, user.id).await?;
    let events: HashMap<i64, EventView> = Event::shared_with(&state.pool, user.id)
        .await?
        .into_iter()
        .map(|view| (view.id, view))
        .collect();

    let items = shares
        .into_iter()
        .filter_map(|share| {
            let event = events.get(&share.event_id)?.clone();
            Some(InboxItem { share, event })
        })
        .collect();
    Ok(Json(items))
}

pub async fn mentions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<EventView>>> {
    Ok(Json(Event::mentioning(&state.pool, user.id).await?))
}

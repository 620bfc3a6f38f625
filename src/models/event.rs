use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool, Type};

/// Board column an event lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize, Default)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Idea,
    Upcoming,
    Past,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Idea => "idea",
            EventStatus::Upcoming => "upcoming",
            EventStatus::Past => "past",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub event_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    /// Order inside the owner's status column, ascending.
    pub position: i64,
    /// Bumped on every content change; clients send it back to detect stale edits.
    pub version: i64,
    /// Owner of the event this one was copied from.
    pub shared_from_user_id: Option<i64>,
    /// Root of the copy chain, never an intermediate copy.
    pub original_event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event with everything a card needs, relative to one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub owner_username: String,
    pub shared_from_username: Option<String>,
    pub like_count: i64,
    pub liked_by_me: bool,
    pub copy_count: i64,
    pub share_count: i64,
    pub mentions: Vec<String>,
}

impl std::ops::Deref for EventView {
    type Target = Event;
    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

#[derive(FromRow)]
struct EventViewRow {
    #[sqlx(flatten)]
    event: Event,
    owner_username: String,
    shared_from_username: Option<String>,
    like_count: i64,
    liked_by_me: i64,
    copy_count: i64,
    share_count: i64,
    mention_list: Option<String>,
}

impl From<EventViewRow> for EventView {
    fn from(row: EventViewRow) -> Self {
        let mut mentions: Vec<String> = row
            .mention_list
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        mentions.sort_by_key(|name| name.to_lowercase());

        Self {
            event: row.event,
            owner_username: row.owner_username,
            shared_from_username: row.shared_from_username,
            like_count: row.like_count,
            liked_by_me: row.liked_by_me != 0,
            copy_count: row.copy_count,
            share_count: row.share_count,
            mentions,
        }
    }
}

/// Fields for a new row, whether authored or copied.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub event_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub shared_from_user_id: Option<i64>,
    pub original_event_id: Option<i64>,
}

const EVENT_COLUMNS: &str = "id, user_id, title, description, status, event_date, location, \
                             image_url, position, version, shared_from_user_id, \
                             original_event_id, created_at, updated_at";

// `$1` is always the viewer.
const EVENT_VIEW_SELECT: &str = "SELECT
    e.id, e.user_id, e.title, e.description, e.status, e.event_date, e.location,
    e.image_url, e.position, e.version, e.shared_from_user_id, e.original_event_id,
    e.created_at, e.updated_at,
    owner.username AS owner_username,
    src.username AS shared_from_username,
    (SELECT COUNT(*) FROM event_likes l WHERE l.event_id = e.id) AS like_count,
    EXISTS (SELECT 1 FROM event_likes l WHERE l.event_id = e.id AND l.user_id = $1) AS liked_by_me,
    (SELECT COUNT(*) FROM events c WHERE c.original_event_id = e.id) AS copy_count,
    (SELECT COUNT(*) FROM event_shares s WHERE s.event_id = e.id) AS share_count,
    (SELECT group_concat(u.username, ',')
       FROM event_mentions m JOIN users u ON u.id = m.user_id
      WHERE m.event_id = e.id) AS mention_list
  FROM events e
  JOIN users owner ON owner.id = e.user_id
  LEFT JOIN users src ON src.id = e.shared_from_user_id";

const BOARD_ORDER: &str = "ORDER BY CASE e.status WHEN 'idea' THEN 0 WHEN 'upcoming' THEN 1 ELSE 2 END,
         e.position, e.id";

impl Event {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Load the card view; visibility is the caller's business.
    pub async fn view(
        pool: &SqlitePool,
        viewer_id: i64,
        id: i64,
    ) -> Result<Option<EventView>, sqlx::Error> {
        let query = format!("{EVENT_VIEW_SELECT} WHERE e.id = $2");
        let row = sqlx::query_as::<_, EventViewRow>(&query)
            .bind(viewer_id)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(EventView::from))
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        user_id: i64,
        data: &NewEvent,
    ) -> Result<Self, sqlx::Error> {
        let position = Self::next_position(conn, user_id, data.status).await?;
        let now = Utc::now();

        let query = format!(
            "INSERT INTO events (user_id, title, description, status, event_date, location,
                                 image_url, position, version, shared_from_user_id,
                                 original_event_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $10, $11, $11)
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(user_id)
            .bind(&data.title)
            .bind(&data.description)
            .bind(data.status)
            .bind(data.event_date)
            .bind(&data.location)
            .bind(&data.image_url)
            .bind(position)
            .bind(data.shared_from_user_id)
            .bind(data.original_event_id)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
    }

    /// Write back every editable field, guarded by the version that was read.
    ///
    /// Returns `None` when the row changed since `expected_version`.
    pub async fn save(
        conn: &mut SqliteConnection,
        event: &Event,
        expected_version: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE events
             SET title = $3, description = $4, status = $5, event_date = $6, location = $7,
                 image_url = $8, position = $9, version = version + 1, updated_at = $10
             WHERE id = $1 AND version = $2
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(event.id)
            .bind(expected_version)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.status)
            .bind(event.event_date)
            .bind(&event.location)
            .bind(&event.image_url)
            .bind(event.position)
            .bind(Utc::now())
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// One past the last position in the owner's column.
    pub async fn next_position(
        conn: &mut SqliteConnection,
        user_id: i64,
        status: EventStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM events WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&mut *conn)
        .await
    }

    /// A user's board, optionally narrowed to one column.
    pub async fn board(
        pool: &SqlitePool,
        viewer_id: i64,
        owner_id: i64,
        status: Option<EventStatus>,
    ) -> Result<Vec<EventView>, sqlx::Error> {
        let query = format!(
            "{EVENT_VIEW_SELECT}
             WHERE e.user_id = $2 AND ($3 IS NULL OR e.status = $3)
             {BOARD_ORDER}"
        );
        let rows = sqlx::query_as::<_, EventViewRow>(&query)
            .bind(viewer_id)
            .bind(owner_id)
            .bind(status)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(EventView::from).collect())
    }

    /// Ids of the owner's events in `status`, in board order.
    pub async fn column_ids(
        conn: &mut SqliteConnection,
        user_id: i64,
        status: EventStatus,
    ) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events WHERE user_id = $1 AND status = $2 ORDER BY position, id",
        )
        .bind(user_id)
        .bind(status)
        .fetch_all(&mut *conn)
        .await
    }

    /// Rewrite positions so `ordered_ids[i]` sits at position `i`.
    pub async fn set_positions(
        conn: &mut SqliteConnection,
        ordered_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE events SET position = $2 WHERE id = $1")
                .bind(id)
                .bind(position as i64)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Move the owner's upcoming events dated before `today` to the end of the past column.
    pub async fn roll_over_elapsed(
        conn: &mut SqliteConnection,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<u64, sqlx::Error> {
        let elapsed = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events
             WHERE user_id = $1 AND status = 'upcoming'
               AND event_date IS NOT NULL AND event_date < $2
             ORDER BY position, id",
        )
        .bind(user_id)
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

        if elapsed.is_empty() {
            return Ok(0);
        }

        let mut position = Self::next_position(conn, user_id, EventStatus::Past).await?;
        let now = Utc::now();
        for id in &elapsed {
            sqlx::query(
                "UPDATE events
                 SET status = 'past', position = $2, version = version + 1, updated_at = $3
                 WHERE id = $1",
            )
            .bind(id)
            .bind(position)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            position += 1;
        }

        Ok(elapsed.len() as u64)
    }

    /// Events of everyone `viewer_id` follows, newest first.
    pub async fn feed(
        pool: &SqlitePool,
        viewer_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<EventView>, sqlx::Error> {
        let query = format!(
            "{EVENT_VIEW_SELECT}
             WHERE e.user_id IN (SELECT following_id FROM follows WHERE follower_id = $1)
               AND ($2 IS NULL OR e.id < $2)
             ORDER BY e.id DESC
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, EventViewRow>(&query)
            .bind(viewer_id)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(EventView::from).collect())
    }

    /// Events whose description mentions `viewer_id`, newest first.
    pub async fn mentioning(
        pool: &SqlitePool,
        viewer_id: i64,
    ) -> Result<Vec<EventView>, sqlx::Error> {
        let query = format!(
            "{EVENT_VIEW_SELECT}
             WHERE e.id IN (SELECT event_id FROM event_mentions WHERE user_id = $1)
             ORDER BY e.id DESC"
        );
        let rows = sqlx::query_as::<_, EventViewRow>(&query)
            .bind(viewer_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(EventView::from).collect())
    }

    /// Events shared with `viewer_id`, in no particular order.
    pub async fn shared_with(
        pool: &SqlitePool,
        viewer_id: i64,
    ) -> Result<Vec<EventView>, sqlx::Error> {
        let query = format!(
            "{EVENT_VIEW_SELECT}
             WHERE e.id IN (SELECT event_id FROM event_shares WHERE recipient_id = $1)"
        );
        let rows = sqlx::query_as::<_, EventViewRow>(&query)
            .bind(viewer_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(EventView::from).collect())
    }

    /// The viewer's existing copy of the chain rooted at `root_id`, if any.
    pub async fn find_copy(
        pool: &SqlitePool,
        user_id: i64,
        root_id: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events WHERE user_id = $1 AND original_event_id = $2",
        )
        .bind(user_id)
        .bind(root_id)
        .fetch_optional(pool)
        .await
    }

    /// Replace the mention set of an event.
    pub async fn replace_mentions(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM event_mentions WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *conn)
            .await?;

        for user_id in user_ids {
            sqlx::query("INSERT OR IGNORE INTO event_mentions (event_id, user_id) VALUES ($1, $2)")
                .bind(event_id)
                .bind(user_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

/// Authoritative like state returned after every like/unlike, so the client
/// can replace whatever it guessed optimistically.
#[derive(Debug, Clone, Serialize)]
pub struct LikeState {
    pub event_id: i64,
    pub liked: bool,
    pub like_count: i64,
}

pub struct Like;

impl Like {
    pub async fn create(pool: &SqlitePool, event_id: i64, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO event_likes (event_id, user_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, event_id: i64, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM event_likes WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn state(
        pool: &SqlitePool,
        event_id: i64,
        user_id: i64,
    ) -> Result<LikeState, sqlx::Error> {
        let (liked, like_count): (i64, i64) = sqlx::query_as(
            "SELECT
                EXISTS (SELECT 1 FROM event_likes WHERE event_id = $1 AND user_id = $2),
                (SELECT COUNT(*) FROM event_likes WHERE event_id = $1)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(LikeState {
            event_id,
            liked: liked != 0,
            like_count,
        })
    }
}

/// One row of a user's share inbox, without the event itself.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShareRecord {
    pub id: i64,
    pub event_id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct Share;

impl Share {
    /// Returns `None` when this sender already shared the event with this recipient.
    pub async fn create(
        pool: &SqlitePool,
        event_id: i64,
        sender_id: i64,
        recipient_id: i64,
        note: Option<&str>,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO event_shares (event_id, sender_id, recipient_id, note, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (event_id, sender_id, recipient_id) DO NOTHING
             RETURNING id",
        )
        .bind(event_id)
        .bind(sender_id)
        .bind(recipient_id)
        .bind(note)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn count_for_event(pool: &SqlitePool, event_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM event_shares WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }

    /// Shares received by `recipient_id`, newest first.
    pub async fn inbox(
        pool: &SqlitePool,
        recipient_id: i64,
    ) -> Result<Vec<ShareRecord>, sqlx::Error> {
        sqlx::query_as::<_, ShareRecord>(
            "SELECT s.id, s.event_id, s.sender_id, u.username AS sender_username, s.note,
                    s.created_at
             FROM event_shares s
             JOIN users u ON u.id = s.sender_id
             WHERE s.recipient_id = $1
             ORDER BY s.id DESC",
        )
        .bind(recipient_id)
        .fetch_all(pool)
        .await
    }
}

use chrono::Utc;
use sqlx::SqlitePool;

use super::user::UserSummary;

/// Directed edge `follower -> following`.
pub struct Follow;

impl Follow {
    /// Returns false when the edge already existed.
    pub async fn create(
        pool: &SqlitePool,
        follower_id: i64,
        following_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at)
             VALUES ($1, $2, $3)",
        )
        .bind(follower_id)
        .bind(following_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns false when there was no edge to remove.
    pub async fn delete(
        pool: &SqlitePool,
        follower_id: i64,
        following_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
                .bind(follower_id)
                .bind(following_id)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn exists(
        pool: &SqlitePool,
        follower_id: i64,
        following_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(pool)
        .await?;

        Ok(found.is_some())
    }

    /// Users following `user_id`, most recent first.
    pub async fn followers(
        pool: &SqlitePool,
        user_id: i64,
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.display_name, u.avatar_url
             FROM follows f
             JOIN users u ON u.id = f.follower_id
             WHERE f.following_id = $1
             ORDER BY f.created_at DESC, f.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Users `user_id` follows, most recent first.
    pub async fn following(
        pool: &SqlitePool,
        user_id: i64,
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.display_name, u.avatar_url
             FROM follows f
             JOIN users u ON u.id = f.following_id
             WHERE f.follower_id = $1
             ORDER BY f.created_at DESC, f.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

/// A registered account row.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub reset_code: Option<String>,
    pub reset_code_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The account as its owner sees it.
#[derive(Debug, Clone, Serialize)]
pub struct PrivateUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PrivateUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            bio: user.bio,
            avatar_url: user.avatar_url,
            created_at: user.created_at,
        }
    }
}

/// Minimal public view used in lists and search results.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Public profile, relative to the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub event_count: i64,
    pub is_following: bool,
    pub follows_you: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ProfileRow {
    id: i64,
    username: String,
    display_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    follower_count: i64,
    following_count: i64,
    event_count: i64,
    is_following: i64,
    follows_you: i64,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            follower_count: row.follower_count,
            following_count: row.following_count,
            event_count: row.event_count,
            is_following: row.is_following != 0,
            follows_you: row.follows_you != 0,
            created_at: row.created_at,
        }
    }
}

/// Profile fields after validation; `None` clears the column.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, bio, avatar_url, \
                            reset_code, reset_code_expires, created_at";

impl User {
    pub async fn create(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive lookup; the column is `COLLATE NOCASE`.
    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Replace the password hash and drop any pending reset code.
    pub async fn update_password(
        pool: &SqlitePool,
        id: i64,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users
             SET password_hash = $2, reset_code = NULL, reset_code_expires = NULL
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_reset_code(
        pool: &SqlitePool,
        id: i64,
        code: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_code = $2, reset_code_expires = $3 WHERE id = $1")
            .bind(id)
            .bind(code)
            .bind(expires)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_profile(
        pool: &SqlitePool,
        id: i64,
        update: &ProfileUpdate,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "UPDATE users SET display_name = $2, bio = $3, avatar_url = $4
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(&update.display_name)
            .bind(&update.bio)
            .bind(&update.avatar_url)
            .fetch_one(pool)
            .await
    }

    pub async fn profile(
        pool: &SqlitePool,
        viewer_id: i64,
        username: &str,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT
                u.id, u.username, u.display_name, u.bio, u.avatar_url, u.created_at,
                (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id) AS follower_count,
                (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id) AS following_count,
                (SELECT COUNT(*) FROM events e WHERE e.user_id = u.id) AS event_count,
                EXISTS (SELECT 1 FROM follows f
                        WHERE f.follower_id = $1 AND f.following_id = u.id) AS is_following,
                EXISTS (SELECT 1 FROM follows f
                        WHERE f.follower_id = u.id AND f.following_id = $1) AS follows_you
             FROM users u
             WHERE u.username = $2",
        )
        .bind(viewer_id)
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    /// Usernames starting with `prefix`, for mention autocomplete.
    pub async fn search_prefix(
        pool: &SqlitePool,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        let pattern = format!("{}%", escape_like(prefix));
        sqlx::query_as::<_, UserSummary>(
            "SELECT id, username, display_name, avatar_url
             FROM users
             WHERE username LIKE $1 ESCAPE '\\'
             ORDER BY username COLLATE NOCASE
             LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Resolve usernames to ids, silently dropping unknown names.
    pub async fn ids_for_usernames(
        conn: &mut SqliteConnection,
        usernames: &[String],
    ) -> Result<Vec<i64>, sqlx::Error> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM users WHERE username IN (");
        let mut separated = builder.separated(", ");
        for name in usernames {
            separated.push_bind(name);
        }
        separated.push_unseparated(")");

        builder
            .build_query_scalar::<i64>()
            .fetch_all(&mut *conn)
            .await
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("a_b%c"), "a\\_b\\%c");
        assert_eq!(escape_like("plain"), "plain");
    }
}

//! Who may see what.
//!
//! An event is visible to its owner, to anyone following the owner, to anyone
//! it was shared with and to anyone mentioned in it. A whole board is only
//! visible to the owner and the owner's followers.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::models::{event::Event, follow::Follow};

/// Why a viewer may see an event, strongest reason first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAccess {
    Owner,
    Follower,
    Recipient,
    Mentioned,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessFlags {
    pub owner: bool,
    pub follows_owner: bool,
    pub shared_with: bool,
    pub mentioned: bool,
}

impl AccessFlags {
    pub fn resolve(self) -> Option<EventAccess> {
        if self.owner {
            Some(EventAccess::Owner)
        } else if self.follows_owner {
            Some(EventAccess::Follower)
        } else if self.shared_with {
            Some(EventAccess::Recipient)
        } else if self.mentioned {
            Some(EventAccess::Mentioned)
        } else {
            None
        }
    }
}

#[derive(FromRow)]
struct AccessRow {
    #[sqlx(flatten)]
    event: Event,
    follows_owner: i64,
    shared_with: i64,
    mentioned: i64,
}

/// Load event `event_id` together with the viewer's access to it, in one query.
///
/// `None` when the event is missing or the viewer may not see it.
pub async fn visible_event(
    pool: &SqlitePool,
    viewer_id: i64,
    event_id: i64,
) -> Result<Option<(Event, EventAccess)>, sqlx::Error> {
    let row = sqlx::query_as::<_, AccessRow>(
        "SELECT e.*,
            EXISTS (SELECT 1 FROM follows f
                    WHERE f.follower_id = $1 AND f.following_id = e.user_id) AS follows_owner,
            EXISTS (SELECT 1 FROM event_shares s
                    WHERE s.event_id = e.id AND s.recipient_id = $1) AS shared_with,
            EXISTS (SELECT 1 FROM event_mentions m
                    WHERE m.event_id = e.id AND m.user_id = $1) AS mentioned
         FROM events e
         WHERE e.id = $2",
    )
    .bind(viewer_id)
    .bind(event_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|row| {
        let flags = AccessFlags {
            owner: row.event.user_id == viewer_id,
            follows_owner: row.follows_owner != 0,
            shared_with: row.shared_with != 0,
            mentioned: row.mentioned != 0,
        };
        flags.resolve().map(|access| (row.event, access))
    }))
}

pub async fn can_view_board(
    pool: &SqlitePool,
    viewer_id: i64,
    owner_id: i64,
) -> Result<bool, sqlx::Error> {
    if viewer_id == owner_id {
        return Ok(true);
    }
    Follow::exists(pool, viewer_id, owner_id).await
}

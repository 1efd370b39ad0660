//! Database row types. These map directly to SQLite rows and stay stringly
//! typed; conversion into plaza-types models happens at the edges.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use plaza_types::models::Message;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub profile_img: String,
    pub cover_img: String,
    pub bio: String,
    pub link: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A post joined with its author's display fields.
pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub author_username: String,
    pub author_full_name: String,
    pub author_profile_img: String,
    pub text: Option<String>,
    pub img: Option<String>,
    pub created_at: String,
}

pub struct LikeRow {
    pub post_id: String,
    pub user_id: String,
}

/// A comment joined with its author's display fields.
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub author_username: String,
    pub author_full_name: String,
    pub author_profile_img: String,
    pub text: String,
    pub created_at: String,
}

/// A notification joined with the sender's display fields.
pub struct NotificationRow {
    pub id: String,
    pub from_id: String,
    pub from_username: String,
    pub from_full_name: String,
    pub from_profile_img: String,
    pub to_id: String,
    pub kind: String,
    pub read: bool,
    pub post_id: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: String,
}

/// Parse a stored id, logging and substituting the nil UUID if the row is corrupt.
pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's `datetime('now')` form.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: parse_uuid(&row.id, "message id"),
            sender_id: parse_uuid(&row.sender_id, "sender_id"),
            receiver_id: parse_uuid(&row.receiver_id, "receiver_id"),
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

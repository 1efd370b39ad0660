//! Row -> response conversions, plus the loaders that gather the related rows
//! a response needs. Loaders are synchronous and run inside `Database::call`.

use std::collections::HashMap;

use anyhow::Result;
use uuid::Uuid;

use plaza_db::Database;
use plaza_db::models::{CommentRow, NotificationRow, PostRow, UserRow, parse_timestamp, parse_uuid};
use plaza_types::api::{CommentResponse, NotificationResponse, PostResponse, UserProfile, UserSummary};
use plaza_types::models::NotificationKind;

fn parse_ids(ids: Vec<String>, what: &str) -> Vec<Uuid> {
    ids.iter().map(|id| parse_uuid(id, what)).collect()
}

pub fn summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&user.id, "user id"),
        username: user.username.clone(),
        full_name: user.full_name.clone(),
        profile_img: user.profile_img.clone(),
    }
}

pub fn load_profile(db: &Database, user: UserRow) -> Result<UserProfile> {
    let followers = db.get_follower_ids(&user.id)?;
    let following = db.get_following_ids(&user.id)?;
    let liked_posts = db.get_liked_post_ids(&user.id)?;

    Ok(UserProfile {
        id: parse_uuid(&user.id, "user id"),
        followers: parse_ids(followers, "follower id"),
        following: parse_ids(following, "following id"),
        liked_posts: parse_ids(liked_posts, "liked post id"),
        created_at: parse_timestamp(&user.created_at),
        updated_at: parse_timestamp(&user.updated_at),
        username: user.username,
        full_name: user.full_name,
        email: user.email,
        profile_img: user.profile_img,
        cover_img: user.cover_img,
        bio: user.bio,
        link: user.link,
    })
}

fn comment(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&row.id, "comment id"),
        user: UserSummary {
            id: parse_uuid(&row.user_id, "comment user_id"),
            username: row.author_username,
            full_name: row.author_full_name,
            profile_img: row.author_profile_img,
        },
        text: row.text,
        created_at: parse_timestamp(&row.created_at),
    }
}

/// Populate posts with their likes and comments, preserving the input order.
pub fn load_posts(db: &Database, rows: Vec<PostRow>) -> Result<Vec<PostResponse>> {
    let post_ids: Vec<String> = rows.iter().map(|p| p.id.clone()).collect();

    let mut likes: HashMap<String, Vec<Uuid>> = HashMap::new();
    for like in db.get_likes_for_posts(&post_ids)? {
        likes
            .entry(like.post_id)
            .or_default()
            .push(parse_uuid(&like.user_id, "like user_id"));
    }

    let mut comments: HashMap<String, Vec<CommentResponse>> = HashMap::new();
    for row in db.get_comments_for_posts(&post_ids)? {
        comments.entry(row.post_id.clone()).or_default().push(comment(row));
    }

    Ok(rows
        .into_iter()
        .map(|row| PostResponse {
            id: parse_uuid(&row.id, "post id"),
            user: UserSummary {
                id: parse_uuid(&row.user_id, "post user_id"),
                username: row.author_username,
                full_name: row.author_full_name,
                profile_img: row.author_profile_img,
            },
            likes: likes.remove(&row.id).unwrap_or_default(),
            comments: comments.remove(&row.id).unwrap_or_default(),
            text: row.text,
            img: row.img,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect())
}

/// Single populated post, or `None` if it no longer exists.
pub fn load_post(db: &Database, post_id: &str) -> Result<Option<PostResponse>> {
    let Some(row) = db.get_post(post_id)? else {
        return Ok(None);
    };
    Ok(load_posts(db, vec![row])?.pop())
}

/// `None` for rows whose kind this build does not know.
pub fn notification(row: NotificationRow) -> Option<NotificationResponse> {
    let kind = match row.kind.parse::<NotificationKind>() {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!("Skipping notification {}: {}", row.id, e);
            return None;
        }
    };

    Some(NotificationResponse {
        id: parse_uuid(&row.id, "notification id"),
        from: UserSummary {
            id: parse_uuid(&row.from_id, "notification from_id"),
            username: row.from_username,
            full_name: row.from_full_name,
            profile_img: row.from_profile_img,
        },
        to: parse_uuid(&row.to_id, "notification to_id"),
        kind,
        read: row.read,
        post_id: row.post_id.as_deref().map(|id| parse_uuid(id, "notification post_id")),
        created_at: parse_timestamp(&row.created_at),
    })
}

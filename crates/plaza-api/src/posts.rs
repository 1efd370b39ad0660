use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use plaza_db::models::parse_uuid;
use plaza_types::api::{Claims, CommentRequest, CreatePostRequest, MessageBody, PostResponse};
use plaza_types::ids::parse_id;
use plaza_types::models::NotificationKind;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views;

fn post_id(raw: &str) -> ApiResult<Uuid> {
    parse_id(raw).ok_or_else(|| ApiError::bad_request("Invalid post ID"))
}

/// Trimmed, with blank strings treated as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = non_blank(req.text);
    let img = non_blank(req.img);
    if text.is_none() && img.is_none() {
        return Err(ApiError::bad_request("Post must have text or image"));
    }

    let id = Uuid::new_v4().to_string();
    let author = claims.sub.to_string();
    let post = state
        .db
        .call(move |db| {
            if !db.user_exists(&author)? {
                return Ok(None);
            }
            db.create_post(&id, &author, text.as_deref(), img.as_deref())?;
            views::load_post(db, &id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::debug!("User {} created post {}", claims.sub, post.id);
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageBody>> {
    let id = post_id(&id)?.to_string();
    let me = claims.sub.to_string();

    state
        .db
        .call(move |db| {
            let Some(post) = db.get_post(&id)? else {
                return Ok(Err(ApiError::not_found("Post not found")));
            };
            if post.user_id != me {
                return Ok(Err(ApiError::Forbidden(
                    "You are not authorized to delete this post".into(),
                )));
            }
            db.delete_post(&id)?;
            Ok(Ok(()))
        })
        .await??;

    Ok(Json(MessageBody::new("Post deleted successfully")))
}

/// POST /api/posts/like/{id}: toggles the caller's like and returns the
/// post's resulting likes.
pub async fn like_unlike(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Uuid>>> {
    let pid = post_id(&id)?;
    let (post, me) = (pid.to_string(), claims.sub.to_string());

    let (owner, liked, likes) = state
        .db
        .call(move |db| {
            let Some(row) = db.get_post(&post)? else {
                return Ok(None);
            };
            let liked = db.toggle_like(&post, &me)?;
            let likes = db.get_post_likes(&post)?;
            Ok(Some((row.user_id, liked, likes)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    if liked {
        let owner = parse_uuid(&owner, "post user_id");
        state
            .fanout
            .notify(claims.sub, owner, NotificationKind::Like, Some(pid))
            .await;
    }

    Ok(Json(
        likes.iter().map(|id| parse_uuid(id, "like user_id")).collect(),
    ))
}

pub async fn comment_on_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<PostResponse>> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::bad_request("Text field is required"));
    }

    let pid = post_id(&id)?;
    let (post, me) = (pid.to_string(), claims.sub.to_string());
    let comment_id = Uuid::new_v4().to_string();

    let populated = state
        .db
        .call(move |db| {
            if db.get_post(&post)?.is_none() {
                return Ok(None);
            }
            db.add_comment(&comment_id, &post, &me, &text)?;
            views::load_post(db, &post)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    state
        .fanout
        .notify(claims.sub, populated.user.id, NotificationKind::Comment, Some(pid))
        .await;

    Ok(Json(populated))
}

/// The comment's author or the post's owner may remove a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PostResponse>> {
    let post = post_id(&id)?.to_string();
    let comment = parse_id(&comment_id)
        .ok_or_else(|| ApiError::bad_request("Invalid comment ID"))?
        .to_string();
    let me = claims.sub.to_string();

    state
        .db
        .call(move |db| {
            let Some(post_row) = db.get_post(&post)? else {
                return Ok(Err(ApiError::not_found("Post not found")));
            };
            let Some(comment_row) = db.get_comment(&comment)? else {
                return Ok(Err(ApiError::not_found("Comment not found")));
            };
            if comment_row.post_id != post {
                return Ok(Err(ApiError::not_found("Comment not found")));
            }
            if comment_row.user_id != me && post_row.user_id != me {
                return Ok(Err(ApiError::Forbidden(
                    "You are not authorized to delete this comment".into(),
                )));
            }
            db.delete_comment(&comment)?;
            match views::load_post(db, &post)? {
                Some(populated) => Ok(Ok(populated)),
                None => Ok(Err(ApiError::not_found("Post not found"))),
            }
        })
        .await?
        .map(Json)
}

pub async fn all_posts(State(state): State<AppState>) -> ApiResult<Json<Vec<PostResponse>>> {
    let posts = state
        .db
        .call(|db| {
            let rows = db.get_all_posts()?;
            views::load_posts(db, rows)
        })
        .await?;

    Ok(Json(posts))
}

/// Feed of posts by accounts the caller follows.
pub async fn following_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let me = claims.sub.to_string();
    let posts = state
        .db
        .call(move |db| {
            let rows = db.get_following_posts(&me)?;
            views::load_posts(db, rows)
        })
        .await?;

    Ok(Json(posts))
}

pub async fn liked_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let user = parse_id(&id)
        .ok_or_else(|| ApiError::bad_request("Invalid user ID"))?
        .to_string();

    let posts = state
        .db
        .call(move |db| {
            if !db.user_exists(&user)? {
                return Ok(None);
            }
            let rows = db.get_liked_posts(&user)?;
            views::load_posts(db, rows).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(posts))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let posts = state
        .db
        .call(move |db| {
            let Some(user) = db.get_user_by_username(&username)? else {
                return Ok(None);
            };
            let rows = db.get_user_posts(&user.id)?;
            views::load_posts(db, rows).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(posts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_count_as_missing() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" hi ".into())), Some("hi".into()));
    }

    #[test]
    fn post_id_must_be_a_uuid() {
        assert!(matches!(post_id("nope"), Err(ApiError::BadRequest(_))));
        let id = Uuid::new_v4();
        assert_eq!(post_id(&id.to_string()).unwrap(), id);
    }
}

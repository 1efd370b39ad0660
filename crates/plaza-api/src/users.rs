use axum::{
    Extension, Json,
    extract::{Path, State},
};

use plaza_db::queries::ProfileChanges;
use plaza_types::api::{Claims, FollowResponse, UpdateProfileRequest, UserProfile, UserSummary};
use plaza_types::ids::{is_valid_email, is_valid_username, parse_id};
use plaza_types::models::NotificationKind;

use crate::auth::{MIN_PASSWORD_LEN, hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views;

const SUGGESTION_COUNT: u32 = 4;

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let profile = state
        .db
        .call(move |db| match db.get_user_by_username(&username)? {
            Some(row) => views::load_profile(db, row).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(profile))
}

pub async fn suggested_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let me = claims.sub.to_string();
    let rows = state
        .db
        .call(move |db| db.get_suggested_users(&me, SUGGESTION_COUNT))
        .await?;

    Ok(Json(rows.iter().map(views::summary).collect()))
}

/// POST /api/users/follow/{id}: follows if not following, unfollows otherwise.
pub async fn follow_unfollow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<FollowResponse>> {
    let target = parse_id(&id).ok_or_else(|| ApiError::bad_request("Invalid user ID"))?;
    if target == claims.sub {
        return Err(ApiError::bad_request("You can't follow/unfollow yourself"));
    }

    let (me, them) = (claims.sub.to_string(), target.to_string());
    let following = state
        .db
        .call(move |db| {
            if !db.user_exists(&them)? {
                return Ok(None);
            }
            db.toggle_follow(&me, &them).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if following {
        state
            .fanout
            .notify(claims.sub, target, NotificationKind::Follow, None)
            .await;
    }

    let message = if following {
        "User followed successfully"
    } else {
        "User unfollowed successfully"
    };
    Ok(Json(FollowResponse {
        following,
        message: message.into(),
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let me = claims.sub.to_string();
    let id = me.clone();
    let current = state
        .db
        .call(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let password_hash = match (&req.current_password, &req.new_password) {
        (None, None) => None,
        (Some(current_pw), Some(new_pw)) => {
            if !verify_password(current_pw, &current.password)? {
                return Err(ApiError::bad_request("Current password is incorrect"));
            }
            if new_pw.len() < MIN_PASSWORD_LEN {
                return Err(ApiError::bad_request(format!(
                    "Password must be at least {} characters long",
                    MIN_PASSWORD_LEN
                )));
            }
            Some(hash_password(new_pw)?)
        }
        _ => {
            return Err(ApiError::bad_request(
                "Please provide both current password and new password",
            ));
        }
    };

    let full_name = match req.full_name.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => return Err(ApiError::bad_request("Full name is required")),
        other => other,
    };

    // Only changed handles/emails need the shape and uniqueness checks.
    let username = req
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| *u != current.username);
    if let Some(u) = &username {
        if !is_valid_username(u) {
            return Err(ApiError::bad_request(
                "Username must be 3-32 letters, digits, '.', '_' or '-'",
            ));
        }
    }
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| *e != current.email);
    if let Some(e) = &email {
        if !is_valid_email(e) {
            return Err(ApiError::bad_request("Invalid email format"));
        }
    }

    let changes = ProfileChanges {
        full_name,
        email,
        username,
        bio: req.bio,
        link: req.link,
        profile_img: req.profile_img,
        cover_img: req.cover_img,
        password_hash,
    };

    let profile = state
        .db
        .call(move |db| {
            if let Some(u) = &changes.username {
                if db.get_user_by_username(u)?.is_some() {
                    return Ok(Err(ApiError::bad_request("Username is already taken")));
                }
            }
            if let Some(e) = &changes.email {
                if db.get_user_by_email(e)?.is_some() {
                    return Ok(Err(ApiError::bad_request("Email is already taken")));
                }
            }
            db.update_user(&me, &changes)?;
            match db.get_user_by_id(&me)? {
                Some(row) => views::load_profile(db, row).map(Ok),
                None => Ok(Err(ApiError::not_found("User not found"))),
            }
        })
        .await
        .map_err(ApiError::from_user_write)??;

    Ok(Json(profile))
}

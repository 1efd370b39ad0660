use axum::{
    Extension, Json,
    extract::{Path, State},
};

use plaza_types::api::{Claims, MessageBody, NotificationResponse};
use plaza_types::ids::parse_id;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views;

/// Newest first. Fetching marks everything as read; the response still shows
/// the state as it was before the fetch.
pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let me = claims.sub.to_string();
    let rows = state
        .db
        .call(move |db| {
            let rows = db.get_notifications(&me)?;
            db.mark_notifications_read(&me)?;
            Ok(rows)
        })
        .await?;

    Ok(Json(rows.into_iter().filter_map(views::notification).collect()))
}

pub async fn delete_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageBody>> {
    let me = claims.sub.to_string();
    let removed = state
        .db
        .call(move |db| db.delete_notifications(&me))
        .await?;

    tracing::debug!("Deleted {} notifications for {}", removed, claims.sub);
    Ok(Json(MessageBody::new("Notifications deleted successfully")))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageBody>> {
    let id = parse_id(&id)
        .ok_or_else(|| ApiError::bad_request("Invalid notification ID"))?
        .to_string();
    let me = claims.sub.to_string();

    let deleted = state
        .db
        .call(move |db| db.delete_notification(&id, &me))
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok(Json(MessageBody::new("Notification deleted successfully")))
}

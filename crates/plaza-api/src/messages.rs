use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use plaza_types::api::Claims;
use plaza_types::ids::parse_id;
use plaza_types::models::Message;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    /// `createdAt` of the oldest message already held by the client.
    pub before: Option<String>,
}

fn page_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

/// Any RFC 3339 timestamp, normalized to UTC.
fn parse_cursor(raw: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ApiError::bad_request("Invalid cursor"))
    })
    .transpose()
}

/// GET /api/messages/{id}: direct-message history with another user,
/// oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let other = parse_id(&id)
        .ok_or_else(|| ApiError::bad_request("Invalid user ID"))?
        .to_string();
    let me = claims.sub.to_string();
    let limit = page_size(query.limit);
    let before = parse_cursor(query.before.as_deref())?;

    let rows = state
        .db
        .call(move |db| {
            if !db.user_exists(&other)? {
                return Ok(None);
            }
            db.get_conversation(&me, &other, limit, before)
                .map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(rows.into_iter().map(Message::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_and_caps() {
        assert_eq!(page_size(None), DEFAULT_PAGE);
        assert_eq!(page_size(Some(0)), 1);
        assert_eq!(page_size(Some(10)), 10);
        assert_eq!(page_size(Some(10_000)), MAX_PAGE);
    }

    #[test]
    fn cursor_accepts_offsets_and_rejects_garbage() {
        assert_eq!(parse_cursor(None).unwrap(), None);
        let shifted = parse_cursor(Some("2024-01-01T02:00:05.5+02:00")).unwrap().unwrap();
        let utc = parse_cursor(Some("2024-01-01T00:00:05.500Z")).unwrap().unwrap();
        assert_eq!(shifted, utc);
        assert!(matches!(parse_cursor(Some("yesterday")), Err(ApiError::BadRequest(_))));
    }
}

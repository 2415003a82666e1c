//! Activity Feed Endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::Identity,
    error::ApiError,
    types::{FeedEventId, UserId},
    AppState,
};

const FEED_DEFAULT_LIMIT: i64 = 30;
const FEED_MAX_LIMIT: i64 = 100;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Serialize)]
pub struct FeedItem {
    pub id: FeedEventId,
    pub user_id: UserId,
    pub name: Option<String>,
    pub kind: String,
    pub message: String,
    pub meta: Option<serde_json::Value>,
    pub created_at: String,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LikeRequest {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub ok: bool,
    /// 이번 요청으로 새로 눌렸는지
    pub liked: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub user_id: Option<UserId>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub ok: bool,
    pub id: i64,
}

// ============ Handlers ============

/// GET /api/feed?limit=
pub async fn list_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(FEED_DEFAULT_LIMIT)
        .min(FEED_MAX_LIMIT);

    let items = state
        .feed
        .list(limit)
        .await?
        .into_iter()
        .map(|event| FeedItem {
            id: event.id,
            user_id: event.user_id,
            name: event.name,
            kind: event.kind,
            message: event.message,
            // 깨진 meta 는 응답에서만 생략
            meta: event
                .meta_json
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            created_at: event.created_at.to_rfc3339(),
            like_count: event.like_count,
            comment_count: event.comment_count,
        })
        .collect();

    Ok(Json(FeedResponse { items }))
}

/// POST /api/feed/:id/like
pub async fn like(
    State(state): State<AppState>,
    identity: Identity,
    Path(feed_id): Path<FeedEventId>,
    body: Option<Json<LikeRequest>>,
) -> Result<Json<LikeResponse>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let user_id = identity.resolve(req.user_id)?;

    let liked = state.feed.like(feed_id, user_id).await?;
    Ok(Json(LikeResponse { ok: true, liked }))
}

/// POST /api/feed/:id/comment
pub async fn comment(
    State(state): State<AppState>,
    identity: Identity,
    Path(feed_id): Path<FeedEventId>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let user_id = identity.resolve(req.user_id)?;

    state
        .rate_limiter
        .check(&user_id.to_string(), "feed_comment")
        .await?;

    let id = state.feed.comment(feed_id, user_id, &req.text).await?;
    Ok(Json(CommentResponse { ok: true, id }))
}

//! User Endpoints
//!
//! 사용자 등록 (Mini-App 최초 진입), 내 정보, 완료 히스토리

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::Identity,
    error::ApiError,
    services::LeafPassStatus,
    types::{TaskId, UserId},
    AppState,
};

const HISTORY_DEFAULT_LIMIT: usize = 10;
const HISTORY_MAX_LIMIT: usize = 100;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct InitUserRequest {
    pub telegram_id: Option<UserId>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitUserResponse {
    pub user_id: UserId,
}

/// user_id 쿼리 (direct 모드용)
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub telegram_id: UserId,
    pub name: String,
    pub total_points: i64,
    pub streak: i64,
    pub participation_days: i64,
    pub leafpass: LeafPassStatus,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<UserId>,
    /// 기본 10, 최대 100
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub date: String,
    pub completed_at: String,
    pub task_id: TaskId,
    pub title: String,
    pub points: i64,
}

// ============ Handlers ============

/// POST /api/init_user
///
/// 사용자 upsert. 이름이 주어지면 갱신
///
/// # Request
///
/// ```json
/// { "telegram_id": 123456789, "username": "mina_green" }
/// ```
pub async fn init_user(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<InitUserRequest>,
) -> Result<Json<InitUserResponse>, ApiError> {
    let user_id = identity.resolve(req.telegram_id)?;

    state
        .rate_limiter
        .check(&user_id.to_string(), "init_user")
        .await?;

    let name = req
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(identity.display_name());

    let user = state.store.upsert_user(user_id, name, state.calendar.now()).await?;
    tracing::debug!(user_id = user.id, name = %user.name, "User initialized");

    Ok(Json(InitUserResponse { user_id: user.id }))
}

/// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<UserQuery>,
) -> Result<Json<MeResponse>, ApiError> {
    let user_id = identity.resolve(query.user_id)?;

    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;
    let stats = state.stats.stats(user_id).await?;
    let leafpass = state.leafpass.status(user_id).await?;

    Ok(Json(MeResponse {
        telegram_id: user.id,
        name: user.name,
        total_points: stats.total_points,
        streak: stats.streak,
        participation_days: stats.participation_days,
        leafpass,
    }))
}

/// GET /api/history?user_id=&limit=
pub async fn history(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = identity.resolve(query.user_id)?;
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .min(HISTORY_MAX_LIMIT);

    let items = state
        .stats
        .history(user_id, limit)
        .await?
        .into_iter()
        .map(|fact| HistoryItem {
            date: fact.log_date.to_string(),
            completed_at: fact.completed_at.to_rfc3339(),
            task_id: fact.task_id,
            title: fact.title,
            points: fact.points,
        })
        .collect();

    Ok(Json(HistoryResponse { items }))
}

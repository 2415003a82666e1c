//! Quest Endpoints
//!
//! 오늘의 퀘스트 목록, 퀘스트 완료

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::Identity,
    error::ApiError,
    services::{CompletionOutcome, LeafPassStatus, OwnedBadgeView},
    types::{TaskId, UserId, UserStats},
    AppState,
};

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub user_id: Option<UserId>,
    /// "zh", "zh-CN", "en" ...
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskItem {
    pub id: TaskId,
    pub title: String,
    pub points: i64,
    pub completed_today: bool,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<TaskItem>,
    pub stats: UserStats,
    pub badges: Vec<OwnedBadgeView>,
    pub leafpass: LeafPassStatus,
}

#[derive(Debug, Deserialize)]
pub struct QuestsQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestItem {
    pub id: TaskId,
    pub title: String,
    pub points: i64,
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub user_id: Option<UserId>,
    pub task_id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: CompletionOutcome,
}

// ============ Handlers ============

/// GET /api/tasks?user_id=&lang=
///
/// 퀘스트 + 오늘 완료 여부 + 통계 + 배지 + 레벨을 한 번에
pub async fn get_tasks(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<TasksQuery>,
) -> Result<Json<TasksResponse>, ApiError> {
    let user_id = identity.resolve(query.user_id)?;
    let lang = query.lang.as_deref();

    let done_today = state.stats.completed_today(user_id).await?;
    let tasks = state
        .quests
        .available()
        .await?
        .into_iter()
        .map(|task| TaskItem {
            id: task.id,
            title: task.title_for(lang).to_string(),
            points: task.points,
            completed_today: done_today.contains(&task.id),
        })
        .collect();

    let stats = state.stats.stats(user_id).await?;
    let badges = state
        .badges
        .owned(user_id)
        .await?
        .iter()
        .map(OwnedBadgeView::from)
        .collect();
    let leafpass = state.leafpass.status(user_id).await?;

    Ok(Json(TasksResponse {
        tasks,
        stats,
        badges,
        leafpass,
    }))
}

/// GET /api/quests?lang=
pub async fn list_quests(
    State(state): State<AppState>,
    Query(query): Query<QuestsQuery>,
) -> Result<Json<Vec<QuestItem>>, ApiError> {
    let lang = query.lang.as_deref();
    let quests = state
        .quests
        .available()
        .await?
        .into_iter()
        .map(|task| QuestItem {
            id: task.id,
            title: task.title_for(lang).to_string(),
            points: task.points,
            expires_at: task.expires_at.map(|at| at.to_rfc3339()),
        })
        .collect();

    Ok(Json(quests))
}

/// POST /api/complete
///
/// # Response
///
/// ```json
/// {
///   "ok": true,
///   "duplicate": false,
///   "new_badges": [{ "code": "first_step", ... }],
///   "leafpass": { "level": "L1", "name": "Seed", "total_points": 10 }
/// }
/// ```
pub async fn complete(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let user_id = identity.resolve(req.user_id)?;
    let outcome = state.completion.complete(user_id, req.task_id).await?;

    Ok(Json(CompleteResponse { ok: true, outcome }))
}

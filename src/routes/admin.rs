//! Admin Endpoints
//!
//! `X-Admin-Key` 헤더가 `ADMIN_API_KEY` 와 일치해야 함.
//! 키가 설정되지 않은 배포에서는 모든 관리자 요청이 401.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::request::Parts,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{
    db::{NewChallenge, NewTask},
    error::ApiError,
    types::TaskId,
    AppState,
};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// 관리자 인증 extractor
pub struct AdminKey;

/// 상수 시간 비교 (길이가 다르면 false)
fn keys_match(given: &[u8], expected: &[u8]) -> bool {
    given.ct_eq(expected).into()
}

#[async_trait]
impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_key.as_deref() else {
            return Err(ApiError::Unauthorized("admin API is disabled".to_string()));
        };
        let given = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        if keys_match(given, expected.as_bytes()) {
            Ok(AdminKey)
        } else {
            tracing::warn!("Rejected admin request with bad key");
            Err(ApiError::Unauthorized("invalid X-Admin-Key".to_string()))
        }
    }
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct DailyStatsQuery {
    /// YYYY-MM-DD, 기본 오늘
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct DailyStatsResponse {
    pub date: String,
    pub active_today: i64,
    pub new_today: i64,
    pub completions_today: i64,
    pub total_users: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub points: i64,
    #[serde(default)]
    pub i18n: HashMap<String, String>,
    pub active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: TaskId,
    pub title: String,
    pub i18n: HashMap<String, String>,
    pub points: i64,
    pub active: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: Option<String>,
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub task_ids: Vec<TaskId>,
}

// ============ Handlers ============

/// GET /api/admin/daily-stats?date=
pub async fn daily_stats(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(query): Query<DailyStatsQuery>,
) -> Result<Json<DailyStatsResponse>, ApiError> {
    let (date, activity) = state.stats.daily_activity(query.date).await?;

    Ok(Json(DailyStatsResponse {
        date: date.to_string(),
        active_today: activity.active_users,
        new_today: activity.new_users,
        completions_today: activity.completions,
        total_users: activity.total_users,
    }))
}

/// POST /api/admin/tasks
pub async fn create_task(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state
        .quests
        .create(NewTask {
            title: req.title,
            i18n: req.i18n,
            points: req.points,
            active: req.active.unwrap_or(true),
            expires_at: req.expires_at,
        })
        .await?;

    Ok(Json(TaskResponse {
        id: task.id,
        title: task.title,
        i18n: task.i18n,
        points: task.points,
        active: task.active,
        expires_at: task.expires_at.map(|at| at.to_rfc3339()),
        created_at: task.created_at.to_rfc3339(),
    }))
}

/// POST /api/admin/challenges
///
/// end_date < start_date, 없는 퀘스트 id → 400
pub async fn create_challenge(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let challenge = state
        .challenges
        .create(NewChallenge {
            code: req.code.trim().to_string(),
            title: req.title.trim().to_string(),
            description: req.description,
            start_date: req.start_date,
            end_date: req.end_date,
            status: req.status.unwrap_or_else(|| "active".to_string()),
            task_ids: req.task_ids,
        })
        .await?;

    Ok(Json(ChallengeResponse {
        id: challenge.id,
        code: challenge.code,
        title: challenge.title,
        description: challenge.description,
        start_date: challenge.start_date,
        end_date: challenge.end_date,
        status: challenge.status,
        task_ids: challenge.task_ids,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_comparison() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secreT", b"secret"));
        assert!(!keys_match(b"secret-longer", b"secret"));
        assert!(!keys_match(b"", b"secret"));
    }
}

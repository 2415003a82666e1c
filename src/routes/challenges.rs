//! Challenge Endpoints
//!
//! 챌린지 목록, 참가, 리더보드

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::users::UserQuery;
use crate::{
    auth::Identity,
    error::ApiError,
    services::{ChallengeView, LeaderboardRow},
    types::{ChallengeId, UserId},
    AppState,
};

// ============ Request/Response Types ============

#[derive(Debug, Serialize)]
pub struct ChallengesResponse {
    pub challenges: Vec<ChallengeView>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub user_id: Option<UserId>,
    pub challenge_id: ChallengeId,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// 기본 50, 최대 200
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub rows: Vec<LeaderboardRow>,
}

// ============ Handlers ============

/// GET /api/challenges?user_id=
///
/// 신원이 없으면 joined 는 모두 false
pub async fn list_challenges(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<UserQuery>,
) -> Result<Json<ChallengesResponse>, ApiError> {
    let user_id = identity.optional(query.user_id);
    let challenges = state.challenges.list(user_id).await?;
    Ok(Json(ChallengesResponse { challenges }))
}

/// POST /api/challenges/join
pub async fn join_challenge(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<JoinRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let user_id = identity.resolve(req.user_id)?;
    state.challenges.join(user_id, req.challenge_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// GET /api/challenges/:id/leaderboard?limit=
///
/// # Response
///
/// ```json
/// { "rows": [{ "user_id": 1, "name": "mina", "actions": 4, "points": 40 }] }
/// ```
pub async fn leaderboard(
    State(state): State<AppState>,
    Path(challenge_id): Path<ChallengeId>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let rows = state.challenges.leaderboard(challenge_id, query.limit).await?;
    Ok(Json(LeaderboardResponse { rows }))
}

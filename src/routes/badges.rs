//! Badge Endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use super::users::UserQuery;
use crate::{
    auth::Identity,
    error::ApiError,
    services::{NextReward, OwnedBadgeView, DEFAULT_NEXT_REWARDS},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct BadgesResponse {
    pub owned: Vec<OwnedBadgeView>,
    /// 가장 가까운 다음 목표
    pub next: Vec<NextReward>,
}

/// GET /api/badges?user_id=
pub async fn list_badges(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<UserQuery>,
) -> Result<Json<BadgesResponse>, ApiError> {
    let user_id = identity.resolve(query.user_id)?;

    let owned = state
        .badges
        .owned(user_id)
        .await?
        .iter()
        .map(OwnedBadgeView::from)
        .collect();
    let next = state.badges.next_rewards(user_id, DEFAULT_NEXT_REWARDS).await?;

    Ok(Json(BadgesResponse { owned, next }))
}

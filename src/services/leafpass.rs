//! LeafPass Level Service
//!
//! 누적 포인트 → 레벨 티어
//!
//! ```text
//! L1 Seed    0 ~ 99
//! L2 Sprout  100 ~ 499
//! L3 Grove   500 ~ 1499
//! L4 Forest  1500 ~
//! ```
//!
//! # Design Decision
//!
//! 조회 → 비교 → 쓰기 를 애플리케이션에서 하지 않음.
//! 저장소의 조건부 upsert 한 번으로 처리하므로 늦게 도착한 요청이
//! 더 작은 total 로 레벨을 되돌릴 수 없음.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Calendar;
use crate::db::{LevelStatus, Store};
use crate::error::ServiceError;
use crate::types::UserId;

/// 레벨 티어
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelTier {
    pub code: &'static str,
    pub name: &'static str,
    pub min_points: i64,
}

/// 최소 포인트 오름차순
pub const LEVEL_TIERS: [LevelTier; 4] = [
    LevelTier { code: "L1", name: "Seed", min_points: 0 },
    LevelTier { code: "L2", name: "Sprout", min_points: 100 },
    LevelTier { code: "L3", name: "Grove", min_points: 500 },
    LevelTier { code: "L4", name: "Forest", min_points: 1500 },
];

/// total 이하인 가장 높은 티어 (음수는 L1)
pub fn level_for(total_points: i64) -> &'static LevelTier {
    LEVEL_TIERS
        .iter()
        .rev()
        .find(|tier| total_points >= tier.min_points)
        .unwrap_or(&LEVEL_TIERS[0])
}

/// 다음 티어 (최고 티어면 None)
pub fn next_level(total_points: i64) -> Option<&'static LevelTier> {
    LEVEL_TIERS.iter().find(|tier| tier.min_points > total_points)
}

fn tier_by_code(code: &str) -> &'static LevelTier {
    LEVEL_TIERS
        .iter()
        .find(|tier| tier.code == code)
        .unwrap_or(&LEVEL_TIERS[0])
}

/// 레벨 갱신 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafPass {
    pub level: String,
    pub name: String,
    pub total_points: i64,
}

impl From<LevelStatus> for LeafPass {
    fn from(status: LevelStatus) -> Self {
        let tier = tier_by_code(&status.level);
        LeafPass {
            level: status.level,
            name: tier.name.to_string(),
            total_points: status.total_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextLevel {
    pub level: String,
    pub name: String,
    pub min_points: i64,
}

/// 현재 레벨 + 다음 레벨
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafPassStatus {
    pub level: String,
    pub name: String,
    pub total_points: i64,
    pub next: Option<NextLevel>,
}

#[derive(Clone)]
pub struct LeafPassService {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl LeafPassService {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// 레벨 재계산 및 저장
    ///
    /// 반환값은 저장 후 상태. 더 큰 total 이 이미 저장돼 있으면 그 값이 반환됨
    pub async fn update_level(
        &self,
        user_id: UserId,
        total_points: i64,
    ) -> Result<LeafPass, ServiceError> {
        let tier = level_for(total_points);
        let stored = self
            .store
            .upsert_level_status(user_id, tier.code, total_points, self.calendar.now())
            .await?;

        if stored.total_points > total_points {
            tracing::debug!(
                user_id,
                attempted = total_points,
                stored = stored.total_points,
                "Stale level write ignored"
            );
        }
        Ok(stored.into())
    }

    /// 저장된 레벨 조회 (기록 없으면 L1, 0점)
    pub async fn status(&self, user_id: UserId) -> Result<LeafPassStatus, ServiceError> {
        let total_points = self
            .store
            .get_level_status(user_id)
            .await?
            .map(|status| status.total_points)
            .unwrap_or(0);

        let tier = level_for(total_points);
        Ok(LeafPassStatus {
            level: tier.code.to_string(),
            name: tier.name.to_string(),
            total_points,
            next: next_level(total_points).map(|next| NextLevel {
                level: next.code.to_string(),
                name: next.name.to_string(),
                min_points: next.min_points,
            }),
        })
    }
}

//! Badge Unlocker
//!
//! # Interview Q&A
//!
//! Q: 배지를 두 번 지급하지 않는 것은 어떻게 보장하는가?
//! A: (user, badge) 유니크 키 + 멱등 insert
//!    - 동시에 두 요청이 같은 배지를 평가해도 insert 는 하나만 성공
//!    - 진 쪽은 `AlreadyExists` 를 받고 "새 배지" 로 보고하지 않음
//!
//! Q: 규칙 평가는 어디서 하는가?
//! A: `BadgeRule::is_met` 하나. 규칙 종류별 분기 코드가 여러 곳에 흩어지지 않음

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::stats::StatsCalculator;
use crate::clock::Calendar;
use crate::db::{Badge, OwnedBadge, Store};
use crate::error::ServiceError;
use crate::types::{UserId, UserStats};

/// 다음 목표 기본 개수
pub const DEFAULT_NEXT_REWARDS: usize = 3;

/// 배지 응답 형태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeView {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub rule_type: &'static str,
    pub threshold: i64,
}

impl From<&Badge> for BadgeView {
    fn from(badge: &Badge) -> Self {
        BadgeView {
            code: badge.code.clone(),
            title: badge.title.clone(),
            description: badge.description.clone(),
            rule_type: badge.rule.rule_type(),
            threshold: badge.rule.threshold(),
        }
    }
}

/// 획득 배지 응답
#[derive(Debug, Clone, Serialize)]
pub struct OwnedBadgeView {
    #[serde(flatten)]
    pub badge: BadgeView,
    pub unlocked_at: String,
}

impl From<&OwnedBadge> for OwnedBadgeView {
    fn from(owned: &OwnedBadge) -> Self {
        OwnedBadgeView {
            badge: (&owned.badge).into(),
            unlocked_at: owned.unlocked_at.to_rfc3339(),
        }
    }
}

/// 아직 못 받은 배지 + 남은 양
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextReward {
    #[serde(flatten)]
    pub badge: BadgeView,
    pub current: i64,
    pub remaining: i64,
}

/// 카탈로그 중 미보유 + 조건 충족 배지 (카탈로그 순서 유지)
pub fn eligible<'a>(
    catalog: &'a [Badge],
    owned_codes: &HashSet<String>,
    stats: &UserStats,
) -> Vec<&'a Badge> {
    catalog
        .iter()
        .filter(|badge| !owned_codes.contains(&badge.code))
        .filter(|badge| badge.rule.is_met(stats))
        .collect()
}

/// 남은 양이 적은 순 (remaining, threshold, code)
pub fn upcoming(
    catalog: &[Badge],
    owned_codes: &HashSet<String>,
    stats: &UserStats,
    limit: usize,
) -> Vec<NextReward> {
    let mut rewards: Vec<NextReward> = catalog
        .iter()
        .filter(|badge| !owned_codes.contains(&badge.code))
        .filter_map(|badge| {
            let remaining = badge.rule.remaining(stats);
            (remaining > 0).then(|| NextReward {
                badge: badge.into(),
                current: badge.rule.current_value(stats),
                remaining,
            })
        })
        .collect();

    rewards.sort_by(|a, b| {
        (a.remaining, a.badge.threshold, &a.badge.code)
            .cmp(&(b.remaining, b.badge.threshold, &b.badge.code))
    });
    rewards.truncate(limit);
    rewards
}

#[derive(Clone)]
pub struct BadgeUnlocker {
    store: Arc<dyn Store>,
    calendar: Calendar,
    stats: StatsCalculator,
}

impl BadgeUnlocker {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar, stats: StatsCalculator) -> Self {
        Self { store, calendar, stats }
    }

    /// 통계를 새로 계산해 배지 지급
    pub async fn unlock_eligible(&self, user_id: UserId) -> Result<Vec<Badge>, ServiceError> {
        let stats = self.stats.stats(user_id).await?;
        self.unlock_with_stats(user_id, &stats).await
    }

    /// 이미 계산된 통계로 배지 지급
    ///
    /// 이번 호출에서 실제로 insert 된 배지만 반환
    pub async fn unlock_with_stats(
        &self,
        user_id: UserId,
        stats: &UserStats,
    ) -> Result<Vec<Badge>, ServiceError> {
        let catalog = self.store.list_badges().await?;
        let owned = self.owned_codes(user_id).await?;
        let now = self.calendar.now();

        let mut granted = Vec::new();
        for badge in eligible(&catalog, &owned, stats) {
            let outcome = self.store.grant_badge(user_id, &badge.code, now).await?;
            if outcome.inserted() {
                tracing::info!(user_id, badge = %badge.code, "Badge unlocked");
                granted.push(badge.clone());
            }
        }
        Ok(granted)
    }

    /// 다음에 받을 수 있는 배지
    pub async fn next_rewards(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<NextReward>, ServiceError> {
        let stats = self.stats.stats(user_id).await?;
        let catalog = self.store.list_badges().await?;
        let owned = self.owned_codes(user_id).await?;
        Ok(upcoming(&catalog, &owned, &stats, limit))
    }

    /// 획득 배지 (최근 순)
    pub async fn owned(&self, user_id: UserId) -> Result<Vec<OwnedBadge>, ServiceError> {
        Ok(self.store.user_badges(user_id).await?)
    }

    async fn owned_codes(&self, user_id: UserId) -> Result<HashSet<String>, ServiceError> {
        Ok(self
            .store
            .user_badges(user_id)
            .await?
            .into_iter()
            .map(|owned| owned.badge.code)
            .collect())
    }
}

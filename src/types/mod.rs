//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 도메인 타입 정의

use std::fmt;

use serde::Serialize;

/// Telegram 사용자 ID (users 테이블 PK로 그대로 사용)
pub type UserId = i64;
pub type TaskId = i64;
pub type ChallengeId = i64;
pub type FeedEventId = i64;

/// 사용자 통계 (완료 로그에서 매번 재계산)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_points: i64,
    pub streak: i64,
    pub today_completed: i64,
    pub total_tasks: i64,
    pub total_completions: i64,
    pub participation_days: i64,
}

/// 배지 규칙
///
/// # Design Decision
///
/// 문자열 비교("streak", "total_points" ...) 대신 enum 으로 모델링
/// - 새 규칙 추가 시 match 누락을 컴파일러가 잡아줌
/// - 임계값은 variant 가 직접 보유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    /// 오늘까지 연속 참여 일수
    Streak(i64),
    /// 누적 포인트
    TotalPoints(i64),
    /// 누적 완료 횟수
    TotalCompletions(i64),
    /// 누적 참여 일수 (연속 아니어도 됨)
    ParticipationDays(i64),
}

/// 알 수 없는 rule_type 문자열
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRule(pub String);

impl fmt::Display for UnknownRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown badge rule type '{}'", self.0)
    }
}

impl std::error::Error for UnknownRule {}

impl BadgeRule {
    /// 저장소 표현 (rule_type, threshold) 에서 복원
    pub fn from_parts(rule_type: &str, threshold: i64) -> Result<Self, UnknownRule> {
        match rule_type {
            "streak" => Ok(BadgeRule::Streak(threshold)),
            "total_points" => Ok(BadgeRule::TotalPoints(threshold)),
            "total_completions" => Ok(BadgeRule::TotalCompletions(threshold)),
            "participation_days" => Ok(BadgeRule::ParticipationDays(threshold)),
            other => Err(UnknownRule(other.to_string())),
        }
    }

    pub fn rule_type(&self) -> &'static str {
        match self {
            BadgeRule::Streak(_) => "streak",
            BadgeRule::TotalPoints(_) => "total_points",
            BadgeRule::TotalCompletions(_) => "total_completions",
            BadgeRule::ParticipationDays(_) => "participation_days",
        }
    }

    pub fn threshold(&self) -> i64 {
        match *self {
            BadgeRule::Streak(t)
            | BadgeRule::TotalPoints(t)
            | BadgeRule::TotalCompletions(t)
            | BadgeRule::ParticipationDays(t) => t,
        }
    }

    /// 규칙이 바라보는 현재 통계값
    pub fn current_value(&self, stats: &UserStats) -> i64 {
        match self {
            BadgeRule::Streak(_) => stats.streak,
            BadgeRule::TotalPoints(_) => stats.total_points,
            BadgeRule::TotalCompletions(_) => stats.total_completions,
            BadgeRule::ParticipationDays(_) => stats.participation_days,
        }
    }

    pub fn is_met(&self, stats: &UserStats) -> bool {
        self.current_value(stats) >= self.threshold()
    }

    /// 임계값까지 남은 양 (달성 시 0)
    pub fn remaining(&self, stats: &UserStats) -> i64 {
        self.threshold().saturating_sub(self.current_value(stats)).max(0)
    }
}

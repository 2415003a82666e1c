//! Stats Calculator
//!
//! # Interview Q&A
//!
//! Q: 통계를 별도 테이블에 누적하지 않고 매번 계산하는 이유는?
//! A: 완료 로그가 유일한 원본
//!    - 누적 컬럼은 동시 요청에서 lost update 위험
//!    - 사용자당 로그 수가 작아 fold 비용이 무시할 수준
//!    - 배지/레벨/리더보드가 모두 같은 계산 결과를 보게 됨
//!
//! Q: 연속 일수(streak)는 어떻게 정의하는가?
//! A: 설정 타임존 기준 "오늘"부터 거꾸로 걸어가며 완료가 있는 날을 셈
//!
//!    ```text
//!    D-3  D-2  D-1  D(오늘)
//!     ✗    ✓    ✓    ✓     → 3
//!     ✓    ✓    ✓    ✗     → 0  (오늘 필수)
//!    ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::Calendar;
use crate::db::{CompletionFact, DailyActivity, Store};
use crate::error::ServiceError;
use crate::types::{TaskId, UserId, UserStats};

/// 완료 로그 → 통계 (순수 함수)
pub fn compute_stats(facts: &[CompletionFact], today: NaiveDate, total_tasks: i64) -> UserStats {
    let days: BTreeSet<NaiveDate> = facts.iter().map(|f| f.log_date).collect();
    let today_tasks: HashSet<TaskId> = facts
        .iter()
        .filter(|f| f.log_date == today)
        .map(|f| f.task_id)
        .collect();

    UserStats {
        total_points: facts.iter().fold(0i64, |acc, f| acc.saturating_add(f.points)),
        streak: streak_ending_today(&days, today),
        today_completed: today_tasks.len() as i64,
        total_tasks,
        total_completions: facts.len() as i64,
        participation_days: days.len() as i64,
    }
}

/// 오늘부터 거꾸로 연속된 참여 일수
pub fn streak_ending_today(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> i64 {
    let mut streak = 0;
    let mut cursor = Some(today);
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak += 1;
        cursor = day.pred_opt();
    }
    streak
}

/// 통계 계산 서비스
#[derive(Clone)]
pub struct StatsCalculator {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl StatsCalculator {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// 사용자 통계
    ///
    /// 기록이 없으면 모두 0 (에러 아님)
    pub async fn stats(&self, user_id: UserId) -> Result<UserStats, ServiceError> {
        let facts = self.store.user_completions(user_id).await?;
        let total_tasks = self.available_task_count().await?;
        Ok(compute_stats(&facts, self.calendar.today(), total_tasks))
    }

    /// 오늘 완료한 퀘스트 id
    pub async fn completed_today(&self, user_id: UserId) -> Result<HashSet<TaskId>, ServiceError> {
        let today = self.calendar.today();
        let facts = self.store.user_completions(user_id).await?;
        Ok(facts
            .into_iter()
            .filter(|f| f.log_date == today)
            .map(|f| f.task_id)
            .collect())
    }

    /// 최근 완료 기록
    pub async fn history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<CompletionFact>, ServiceError> {
        let mut facts = self.store.user_completions(user_id).await?;
        facts.truncate(limit);
        Ok(facts)
    }

    /// 하루 활동 집계 (기본: 오늘)
    pub async fn daily_activity(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<(NaiveDate, DailyActivity), ServiceError> {
        let day = date.unwrap_or_else(|| self.calendar.today());
        let (start, end) = self.calendar.day_bounds(day);
        let activity = self.store.daily_activity(day, start, end).await?;
        Ok((day, activity))
    }

    async fn available_task_count(&self) -> Result<i64, ServiceError> {
        let now = self.calendar.now();
        let tasks = self.store.list_tasks().await?;
        Ok(tasks.iter().filter(|t| t.is_available(now)).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn fact(task_id: TaskId, points: i64, log_date: NaiveDate) -> CompletionFact {
        CompletionFact {
            task_id,
            title: format!("task {}", task_id),
            points,
            log_date,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_history_is_all_zero() {
        let stats = compute_stats(&[], day(1), 0);
        assert_eq!(stats, UserStats::default());
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let facts = [fact(1, 10, day(10)), fact(1, 10, day(9)), fact(1, 10, day(8)), fact(1, 10, day(6))];
        assert_eq!(compute_stats(&facts, day(10), 1).streak, 3);
    }

    #[test]
    fn test_streak_requires_today() {
        let facts = [fact(1, 10, day(9)), fact(1, 10, day(8))];
        let stats = compute_stats(&facts, day(10), 1);
        assert_eq!(stats.streak, 0);
        assert_eq!(stats.participation_days, 2);
    }

    #[test]
    fn test_today_counts_distinct_tasks() {
        let facts = [fact(1, 10, day(1)), fact(2, 5, day(1)), fact(1, 10, day(2))];
        let stats = compute_stats(&facts, day(2), 3);

        assert_eq!(stats.total_points, 25);
        assert_eq!(stats.today_completed, 1);
        assert_eq!(stats.total_completions, 3);
        assert_eq!(stats.participation_days, 2);
        assert_eq!(stats.total_tasks, 3);
    }

    #[test]
    fn test_total_points_saturates() {
        let facts = [fact(1, i64::MAX, day(1)), fact(2, 10, day(2))];
        assert_eq!(compute_stats(&facts, day(2), 2).total_points, i64::MAX);
    }

    #[test]
    fn test_streak_survives_month_boundary() {
        let days: BTreeSet<_> = [
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(streak_ending_today(&days, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()), 2);
        assert_eq!(streak_ending_today(&days, day(1) - Duration::days(1)), 0);
    }
}

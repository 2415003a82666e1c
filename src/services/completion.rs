//! Completion Engine
//!
//! # Interview Q&A
//!
//! Q: 완료 처리 순서는?
//! A:
//!    ```text
//!    1. 퀘스트 검증 (존재 / active / 미만료)      → 아니면 NotFound
//!    2. 사용자 lazy 생성
//!    3. completion_logs insert                   → 제약 위반이면 duplicate, 종료
//!    4. 통계 재계산 → 배지 지급 → 레벨 갱신
//!    5. 부수 효과: 피드 이벤트, Telegram 메시지  (실패해도 무시)
//!    ```
//!
//! Q: 같은 요청이 동시에 두 번 들어오면?
//! A: 3번 insert 가 중재 지점. 정확히 하나만 Inserted, 나머지는 duplicate=true.
//!    4~5번은 insert 에 성공한 요청에서만 실행되므로 부수 효과도 한 번만 발생.
//!
//! Q: 알림 전송이 실패하면 완료도 실패하는가?
//! A: 아니오. 이미 커밋된 로그는 되돌리지 않고 warn 로그만 남김

use std::sync::Arc;

use serde::Serialize;

use super::badges::{BadgeUnlocker, BadgeView};
use super::feed::{self, FeedService};
use super::leafpass::{LeafPass, LeafPassService};
use super::notifier::{self, Notifier};
use super::stats::StatsCalculator;
use crate::clock::Calendar;
use crate::db::{Badge, InsertOutcome, Store, Task};
use crate::error::ServiceError;
use crate::types::{TaskId, UserId};

/// 완료 결과
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub duplicate: bool,
    pub new_badges: Vec<BadgeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leafpass: Option<LeafPass>,
}

impl CompletionOutcome {
    fn duplicate() -> Self {
        Self {
            duplicate: true,
            new_badges: Vec::new(),
            leafpass: None,
        }
    }
}

#[derive(Clone)]
pub struct CompletionEngine {
    store: Arc<dyn Store>,
    calendar: Calendar,
    stats: StatsCalculator,
    badges: BadgeUnlocker,
    leafpass: LeafPassService,
    feed: FeedService,
    notifier: Arc<dyn Notifier>,
}

impl CompletionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        calendar: Calendar,
        stats: StatsCalculator,
        badges: BadgeUnlocker,
        leafpass: LeafPassService,
        feed: FeedService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            calendar,
            stats,
            badges,
            leafpass,
            feed,
            notifier,
        }
    }

    /// 오늘 날짜로 퀘스트 완료 기록
    pub async fn complete(
        &self,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<CompletionOutcome, ServiceError> {
        let now = self.calendar.now();
        let today = self.calendar.local_date(now);

        let task = self
            .store
            .get_task(task_id)
            .await?
            .filter(|task| task.is_available(now))
            .ok_or(ServiceError::NotFound("Task"))?;

        self.store.ensure_user(user_id, now).await?;

        match self.store.insert_completion(user_id, task_id, today, now).await? {
            InsertOutcome::AlreadyExists => {
                tracing::debug!(user_id, task_id, %today, "Duplicate completion");
                return Ok(CompletionOutcome::duplicate());
            }
            InsertOutcome::Inserted => {
                tracing::info!(user_id, task_id, %today, points = task.points, "Quest completed");
            }
        }

        let stats = self.stats.stats(user_id).await?;
        let new_badges = self.badges.unlock_with_stats(user_id, &stats).await?;
        let leafpass = self.leafpass.update_level(user_id, stats.total_points).await?;

        self.emit_side_effects(user_id, &task, &new_badges, stats.total_points)
            .await;

        Ok(CompletionOutcome {
            duplicate: false,
            new_badges: new_badges.iter().map(BadgeView::from).collect(),
            leafpass: Some(leafpass),
        })
    }

    async fn emit_side_effects(
        &self,
        user_id: UserId,
        task: &Task,
        new_badges: &[Badge],
        total_points: i64,
    ) {
        self.feed.record(feed::completion_event(user_id, task)).await;
        for badge in new_badges {
            self.feed.record(feed::badge_event(user_id, badge)).await;
        }

        let mut text = format!(
            "✅ {} (+{} pts)\nTotal: {} pts",
            task.title, task.points, total_points
        );
        for badge in new_badges {
            text.push_str(&format!("\n🏅 New badge: {}", badge.title));
        }
        notifier::dispatch(self.notifier.clone(), user_id, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::db::{MemoryStore, NewBadge, NewTask};
    use crate::services::notifier::testing::FailingNotifier;
    use crate::services::notifier::NoopNotifier;
    use crate::types::BadgeRule;
    use chrono::{Duration, NaiveDate};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        engine: CompletionEngine,
        stats: StatsCalculator,
    }

    fn fixture_with(notifier: Arc<dyn Notifier>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at_noon(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let calendar = Calendar::utc(clock.clone());
        let dyn_store: Arc<dyn Store> = store.clone();

        let stats = StatsCalculator::new(dyn_store.clone(), calendar.clone());
        let badges = BadgeUnlocker::new(dyn_store.clone(), calendar.clone(), stats.clone());
        let leafpass = LeafPassService::new(dyn_store.clone(), calendar.clone());
        let feed = FeedService::new(dyn_store.clone(), calendar.clone());
        let engine = CompletionEngine::new(
            dyn_store,
            calendar,
            stats.clone(),
            badges,
            leafpass,
            feed,
            notifier,
        );
        Fixture { store, clock, engine, stats }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NoopNotifier))
    }

    async fn add_task(fx: &Fixture, title: &str, points: i64) -> TaskId {
        fx.store
            .insert_task(&NewTask::new(title, points), fx.clock.now())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_second_completion_is_duplicate() {
        let fx = fixture();
        let walk = add_task(&fx, "Walk 5000 steps", 10).await;

        let first = fx.engine.complete(1, walk).await.unwrap();
        let second = fx.engine.complete(1, walk).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert!(second.leafpass.is_none());
        assert_eq!(fx.store.completion_count().await, 1);
        assert_eq!(fx.stats.stats(1).await.unwrap().total_points, 10);
    }

    #[tokio::test]
    async fn test_daily_scenario() {
        let fx = fixture();
        let walk = add_task(&fx, "Walk 5000 steps", 10).await;
        let cup = add_task(&fx, "Bring your own cup", 10).await;

        fx.engine.complete(1, walk).await.unwrap();
        let stats = fx.stats.stats(1).await.unwrap();
        assert_eq!((stats.total_points, stats.streak, stats.today_completed), (10, 1, 1));

        fx.engine.complete(1, cup).await.unwrap();
        let stats = fx.stats.stats(1).await.unwrap();
        assert_eq!((stats.total_points, stats.streak, stats.today_completed), (20, 1, 2));

        // 2024-01-03, 01-02 에는 기록 없음
        fx.clock.advance(Duration::days(2));
        let stats = fx.stats.stats(1).await.unwrap();
        assert_eq!((stats.total_points, stats.streak, stats.today_completed), (20, 0, 0));
    }

    #[tokio::test]
    async fn test_unavailable_task_not_found() {
        let fx = fixture();
        let mut expired = NewTask::new("Old quest", 5);
        expired.expires_at = Some(fx.clock.now() - Duration::hours(1));
        let expired = fx.store.insert_task(&expired, fx.clock.now()).await.unwrap().id;

        let mut inactive = NewTask::new("Paused quest", 5);
        inactive.active = false;
        let inactive = fx.store.insert_task(&inactive, fx.clock.now()).await.unwrap().id;

        for task_id in [expired, inactive, 999] {
            let err = fx.engine.complete(1, task_id).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound("Task")));
        }
        assert_eq!(fx.store.completion_count().await, 0);
    }

    #[tokio::test]
    async fn test_badges_and_level_reported_once() {
        let fx = fixture();
        fx.store
            .insert_badge(&NewBadge {
                code: "points_100".into(),
                title: "Sprouting".into(),
                description: None,
                rule: BadgeRule::TotalPoints(100),
            })
            .await
            .unwrap();
        let big = add_task(&fx, "Plant a tree", 100).await;

        let outcome = fx.engine.complete(1, big).await.unwrap();
        assert_eq!(outcome.new_badges.len(), 1);
        assert_eq!(outcome.leafpass.unwrap().level, "L2");

        let feed = fx.store.list_feed(10).await.unwrap();
        assert_eq!(feed.len(), 2);

        let again = fx.engine.complete(1, big).await.unwrap();
        assert!(again.new_badges.is_empty());
        assert_eq!(fx.store.list_feed(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_completions_single_winner() {
        let fx = fixture();
        let walk = add_task(&fx, "Walk", 10).await;
        let engine = Arc::new(fx.engine.clone());

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.complete(5, walk).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if !handle.await.unwrap().unwrap().duplicate {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(fx.store.completion_count().await, 1);
    }

    #[tokio::test]
    async fn test_oversized_points_do_not_break_completion() {
        let fx = fixture();
        // 검증을 거치지 않은 기존 데이터
        let jackpot = add_task(&fx, "Jackpot", i64::MAX).await;
        let walk = add_task(&fx, "Walk", 10).await;

        fx.engine.complete(1, jackpot).await.unwrap();
        let outcome = fx.engine.complete(1, walk).await.unwrap();

        assert!(!outcome.duplicate);
        assert_eq!(fx.stats.stats(1).await.unwrap().total_points, i64::MAX);
        assert_eq!(fx.store.get_level_status(1).await.unwrap().unwrap().total_points, i64::MAX);
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_fail_completion() {
        let fx = fixture_with(Arc::new(FailingNotifier));
        let walk = add_task(&fx, "Walk", 10).await;

        let outcome = fx.engine.complete(1, walk).await;
        tokio::task::yield_now().await;

        assert!(!outcome.unwrap().duplicate);
        assert_eq!(fx.store.completion_count().await, 1);
    }
}

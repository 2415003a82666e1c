//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: 왜 Store 를 trait 으로 추상화했는가?
//! A: 저장소 기술과 도메인 규칙 분리
//!
//!    - PostgreSQL 구현 (`Database`): 운영 환경
//!    - 인메모리 구현 (`MemoryStore`): 테스트, 로컬 개발
//!    - 서비스 레이어는 `Arc<dyn Store>` 만 알고 있음
//!
//! Q: 동시 요청에서 중복 완료를 어떻게 막는가?
//! A: 애플리케이션 레벨 "조회 후 삽입" 이 아니라 저장소의 유니크 제약
//!
//!    ```text
//!    요청 A ──insert(user, task, date)──▶ Inserted
//!    요청 B ──insert(user, task, date)──▶ AlreadyExists  (제약 위반 → duplicate)
//!    ```
//!
//!    insert 자체가 중재 지점. 패배한 쪽은 에러가 아니라 `AlreadyExists` 를 받음.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::models::{
    Badge, Challenge, CompletionFact, DailyActivity, FeedEvent, InsertOutcome, LevelStatus,
    NewBadge, NewChallenge, NewFeedEvent, NewTask, OwnedBadge, ScopedCompletion, Task, User,
};
use crate::error::StoreResult;
use crate::types::{ChallengeId, FeedEventId, TaskId, UserId};

/// 트랜잭션 저장소 인터페이스
///
/// 모든 메서드는 단일 원자적 연산으로 동작해야 함
/// (PostgreSQL: 단일 SQL 문 또는 트랜잭션, 인메모리: 단일 락 구간)
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ============ Users ============

    /// 사용자 생성 또는 이름 갱신 (`name` 이 있을 때만)
    async fn upsert_user(&self, id: UserId, name: Option<&str>, now: DateTime<Utc>)
        -> StoreResult<User>;

    /// 없으면 기본 이름으로 생성, 있으면 변경 없음
    async fn ensure_user(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<()>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    // ============ Tasks ============

    async fn insert_task(&self, task: &NewTask, now: DateTime<Utc>) -> StoreResult<Task>;

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// 전체 카탈로그 (id 오름차순, 비활성 포함)
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    // ============ Completion Log ============

    /// (user, task, date) 유니크. 이미 있으면 `AlreadyExists`
    async fn insert_completion(
        &self,
        user_id: UserId,
        task_id: TaskId,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome>;

    /// 사용자의 모든 완료 로그 (최근 순)
    async fn user_completions(&self, user_id: UserId) -> StoreResult<Vec<CompletionFact>>;

    /// 특정 날짜 활동 집계
    ///
    /// `day` 는 완료 로그 날짜, `[day_start, day_end)` 는 신규 가입 판단 구간
    async fn daily_activity(
        &self,
        day: NaiveDate,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> StoreResult<DailyActivity>;

    // ============ Badges ============

    async fn insert_badge(&self, badge: &NewBadge) -> StoreResult<Badge>;

    /// 배지 카탈로그 (id 오름차순)
    async fn list_badges(&self) -> StoreResult<Vec<Badge>>;

    /// 획득 배지 (최근 획득 순)
    async fn user_badges(&self, user_id: UserId) -> StoreResult<Vec<OwnedBadge>>;

    /// (user, badge) 유니크
    async fn grant_badge(
        &self,
        user_id: UserId,
        badge_code: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome>;

    // ============ LeafPass ============

    async fn get_level_status(&self, user_id: UserId) -> StoreResult<Option<LevelStatus>>;

    /// 조건부 원자적 upsert
    ///
    /// 저장된 total_points 가 새 값보다 작거나 같을 때만 덮어씀.
    /// 반환값은 연산 후 저장된 상태 (오래된 쓰기는 무시되고 현재 값을 반환)
    async fn upsert_level_status(
        &self,
        user_id: UserId,
        level: &str,
        total_points: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<LevelStatus>;

    // ============ Challenges ============

    async fn insert_challenge(
        &self,
        challenge: &NewChallenge,
        now: DateTime<Utc>,
    ) -> StoreResult<Challenge>;

    async fn get_challenge(&self, id: ChallengeId) -> StoreResult<Option<Challenge>>;

    /// 최신 순
    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>>;

    async fn user_challenge_ids(&self, user_id: UserId) -> StoreResult<Vec<ChallengeId>>;

    /// (challenge, user) 유니크
    async fn join_challenge(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome>;

    /// 참가자의 완료 중 기간 [start, end] 및 대상 퀘스트에 해당하는 것
    async fn challenge_completions(
        &self,
        challenge: &Challenge,
    ) -> StoreResult<Vec<ScopedCompletion>>;

    // ============ Activity Feed ============

    async fn insert_feed_event(
        &self,
        event: &NewFeedEvent,
        at: DateTime<Utc>,
    ) -> StoreResult<FeedEventId>;

    /// 최신 순, 좋아요/댓글 수 포함
    async fn list_feed(&self, limit: i64) -> StoreResult<Vec<FeedEvent>>;

    async fn feed_event_exists(&self, id: FeedEventId) -> StoreResult<bool>;

    /// (feed, user) 유니크
    async fn like_feed_event(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome>;

    async fn insert_feed_comment(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<i64>;

    // ============ Rate Limit ============

    /// (identity, action, window) 카운터를 원자적으로 증가시키고 증가 후 값을 반환
    ///
    /// 직전 창보다 오래된 카운터는 함께 삭제됨
    async fn increment_rate_counter(
        &self,
        identity: &str,
        action: &str,
        window_id: i64,
    ) -> StoreResult<i64>;
}

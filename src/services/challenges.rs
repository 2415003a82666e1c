//! Challenges & Leaderboard
//!
//! # Interview Q&A
//!
//! Q: 리더보드에 어떤 완료가 집계되는가?
//! A: 세 조건을 모두 만족하는 것만
//!    - 날짜 ∈ [start_date, end_date] (양 끝 포함)
//!    - 퀘스트 ∈ 챌린지 대상 퀘스트 집합
//!    - 사용자 ∈ 참가자 (명시적 join 필요)
//!
//! Q: 동점 처리는?
//! A: points 내림차순 → actions 내림차순 → user_id 오름차순.
//!    마지막 키 덕분에 같은 데이터면 항상 같은 순서

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::clock::Calendar;
use crate::db::{Challenge, NewChallenge, ScopedCompletion, Store, DEFAULT_USER_NAME};
use crate::error::ServiceError;
use crate::types::{ChallengeId, TaskId, UserId};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
pub const MAX_LEADERBOARD_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub name: String,
    pub actions: i64,
    pub points: i64,
}

/// 참가 여부가 포함된 챌린지
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeView {
    pub id: ChallengeId,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub task_ids: Vec<TaskId>,
    pub joined: bool,
}

impl ChallengeView {
    pub fn new(challenge: Challenge, joined: bool) -> Self {
        Self {
            id: challenge.id,
            code: challenge.code,
            title: challenge.title,
            description: challenge.description,
            start_date: challenge.start_date,
            end_date: challenge.end_date,
            status: challenge.status,
            task_ids: challenge.task_ids,
            joined,
        }
    }
}

/// 집계 + 정렬 (순수 함수)
pub fn rank(completions: Vec<ScopedCompletion>, limit: usize) -> Vec<LeaderboardRow> {
    let mut by_user: BTreeMap<UserId, LeaderboardRow> = BTreeMap::new();
    for completion in completions {
        let row = by_user.entry(completion.user_id).or_insert_with(|| LeaderboardRow {
            user_id: completion.user_id,
            name: completion
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
            actions: 0,
            points: 0,
        });
        row.actions += 1;
        row.points = row.points.saturating_add(completion.points);
    }

    let mut rows: Vec<LeaderboardRow> = by_user.into_values().collect();
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.actions.cmp(&a.actions))
            .then(a.user_id.cmp(&b.user_id))
    });
    rows.truncate(limit);
    rows
}

/// 요청 limit → 유효 범위 (기본 50, 최대 200)
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT)
}

#[derive(Clone)]
pub struct ChallengeService {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl ChallengeService {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// 전체 챌린지 (최신 순) + 참가 여부
    pub async fn list(&self, user_id: Option<UserId>) -> Result<Vec<ChallengeView>, ServiceError> {
        let joined: HashSet<ChallengeId> = match user_id {
            Some(user_id) => self.store.user_challenge_ids(user_id).await?.into_iter().collect(),
            None => HashSet::new(),
        };

        Ok(self
            .store
            .list_challenges()
            .await?
            .into_iter()
            .map(|challenge| {
                let is_joined = joined.contains(&challenge.id);
                ChallengeView::new(challenge, is_joined)
            })
            .collect())
    }

    /// 참가 (멱등). 새로 참가했으면 true
    pub async fn join(&self, user_id: UserId, challenge_id: ChallengeId) -> Result<bool, ServiceError> {
        if self.store.get_challenge(challenge_id).await?.is_none() {
            return Err(ServiceError::NotFound("Challenge"));
        }

        let now = self.calendar.now();
        self.store.ensure_user(user_id, now).await?;
        let outcome = self.store.join_challenge(challenge_id, user_id, now).await?;
        if outcome.inserted() {
            tracing::info!(user_id, challenge_id, "Joined challenge");
        }
        Ok(outcome.inserted())
    }

    /// 리더보드. 없는 챌린지는 빈 목록
    pub async fn leaderboard(
        &self,
        challenge_id: ChallengeId,
        limit: Option<usize>,
    ) -> Result<Vec<LeaderboardRow>, ServiceError> {
        let Some(challenge) = self.store.get_challenge(challenge_id).await? else {
            return Ok(Vec::new());
        };
        let completions = self.store.challenge_completions(&challenge).await?;
        Ok(rank(completions, clamp_limit(limit)))
    }

    /// 챌린지 생성 (관리자)
    pub async fn create(&self, challenge: NewChallenge) -> Result<Challenge, ServiceError> {
        if challenge.code.trim().is_empty() || challenge.title.trim().is_empty() {
            return Err(ServiceError::Invalid("code and title are required".to_string()));
        }
        if challenge.end_date < challenge.start_date {
            return Err(ServiceError::Invalid("end_date is before start_date".to_string()));
        }
        for task_id in &challenge.task_ids {
            if self.store.get_task(*task_id).await?.is_none() {
                return Err(ServiceError::Invalid(format!("unknown task id {}", task_id)));
            }
        }

        let created = self
            .store
            .insert_challenge(&challenge, self.calendar.now())
            .await?;
        tracing::info!(challenge_id = created.id, code = %created.code, "Challenge created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::{MemoryStore, NewTask};
    use crate::error::StoreError;
    use chrono::Utc;

    fn scoped(user_id: UserId, points: i64) -> ScopedCompletion {
        ScopedCompletion { user_id, name: None, points }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_rank_ordering_and_ties() {
        let rows = rank(
            vec![
                scoped(3, 10),
                scoped(1, 20),
                scoped(2, 10),
                scoped(2, 10),
                scoped(4, 5),
                scoped(4, 15),
            ],
            10,
        );
        let order: Vec<_> = rows.iter().map(|r| (r.user_id, r.actions, r.points)).collect();
        // 4 와 2 는 20점 2회로 동점 → user_id 오름차순
        assert_eq!(order, vec![(2, 2, 20), (4, 2, 20), (1, 1, 20), (3, 1, 10)]);
        assert_eq!(rows[0].name, DEFAULT_USER_NAME);
    }

    #[test]
    fn test_rank_points_saturate() {
        let rows = rank(vec![scoped(1, i64::MAX), scoped(1, 10), scoped(2, 10)], 10);
        assert_eq!((rows[0].user_id, rows[0].actions, rows[0].points), (1, 2, i64::MAX));
    }

    #[test]
    fn test_limit_clamping() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(5000)), 200);
    }

    async fn setup() -> (Arc<dyn Store>, ChallengeService, Vec<TaskId>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let calendar = Calendar::utc(Arc::new(FixedClock::at_noon(day(15))));
        let now = Utc::now();
        let walk = store.insert_task(&NewTask::new("Walk", 10), now).await.unwrap().id;
        let cup = store.insert_task(&NewTask::new("Cup", 5), now).await.unwrap().id;
        (store.clone(), ChallengeService::new(store, calendar), vec![walk, cup])
    }

    fn new_challenge(task_ids: Vec<TaskId>) -> NewChallenge {
        NewChallenge {
            code: "jan".into(),
            title: "January".into(),
            description: None,
            start_date: day(10),
            end_date: day(20),
            status: "active".into(),
            task_ids,
        }
    }

    #[tokio::test]
    async fn test_leaderboard_excludes_out_of_range_dates() {
        let (store, service, tasks) = setup().await;
        let walk = tasks[0];
        let challenge = service.create(new_challenge(vec![walk])).await.unwrap();
        let now = Utc::now();

        service.join(1, challenge.id).await.unwrap();
        store.insert_completion(1, walk, day(9), now).await.unwrap();
        store.insert_completion(1, walk, day(10), now).await.unwrap();
        store.insert_completion(1, walk, day(20), now).await.unwrap();
        store.insert_completion(1, walk, day(21), now).await.unwrap();

        let rows = service.leaderboard(challenge.id, None).await.unwrap();
        assert_eq!(rows, vec![LeaderboardRow {
            user_id: 1,
            name: DEFAULT_USER_NAME.to_string(),
            actions: 2,
            points: 20,
        }]);
    }

    #[tokio::test]
    async fn test_leaderboard_only_counts_participants_and_task_set() {
        let (store, service, tasks) = setup().await;
        let (walk, cup) = (tasks[0], tasks[1]);
        let challenge = service.create(new_challenge(vec![walk])).await.unwrap();
        let now = Utc::now();

        store.ensure_user(2, now).await.unwrap();
        store.insert_completion(2, walk, day(12), now).await.unwrap();
        assert!(service.leaderboard(challenge.id, None).await.unwrap().is_empty());

        service.join(2, challenge.id).await.unwrap();
        store.insert_completion(2, cup, day(12), now).await.unwrap();
        let rows = service.leaderboard(challenge.id, None).await.unwrap();
        assert_eq!((rows[0].actions, rows[0].points), (1, 10));
    }

    #[tokio::test]
    async fn test_join_and_list() {
        let (_, service, tasks) = setup().await;
        let challenge = service.create(new_challenge(tasks)).await.unwrap();

        assert!(service.join(7, challenge.id).await.unwrap());
        assert!(!service.join(7, challenge.id).await.unwrap());
        assert!(matches!(service.join(7, 999).await, Err(ServiceError::NotFound(_))));

        let mine = service.list(Some(7)).await.unwrap();
        assert!(mine[0].joined);
        let anonymous = service.list(None).await.unwrap();
        assert!(!anonymous[0].joined);

        assert!(service.leaderboard(999, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_, service, tasks) = setup().await;

        let mut backwards = new_challenge(tasks.clone());
        backwards.end_date = day(1);
        assert!(matches!(service.create(backwards).await, Err(ServiceError::Invalid(_))));

        let unknown = new_challenge(vec![tasks[0], 404]);
        assert!(matches!(service.create(unknown).await, Err(ServiceError::Invalid(_))));

        service.create(new_challenge(tasks.clone())).await.unwrap();
        let duplicate = service.create(new_challenge(tasks)).await;
        assert!(matches!(duplicate, Err(ServiceError::Store(StoreError::Conflict(_)))));
    }
}

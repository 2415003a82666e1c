//! In-memory Store
//!
//! 테스트와 로컬 개발용 저장소. 모든 테이블을 하나의 `tokio::sync::Mutex` 뒤에 두어
//! 각 메서드 호출이 SQL 단일 문장과 같은 원자성을 가짐.
//! 유니크 제약은 키 집합으로 강제함.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::models::{
    Badge, Challenge, CompletionFact, DailyActivity, FeedEvent, InsertOutcome, LevelStatus,
    NewBadge, NewChallenge, NewFeedEvent, NewTask, OwnedBadge, ScopedCompletion, Task, User,
    DEFAULT_USER_NAME,
};
use super::repository::Store;
use crate::error::{StoreError, StoreResult};
use crate::types::{ChallengeId, FeedEventId, TaskId, UserId};

#[derive(Debug, Clone)]
struct CompletionRow {
    user_id: UserId,
    task_id: TaskId,
    date: NaiveDate,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FeedRow {
    user_id: UserId,
    kind: String,
    message: String,
    meta_json: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,

    tasks: BTreeMap<TaskId, Task>,
    next_task_id: TaskId,

    completions: Vec<CompletionRow>,
    /// UNIQUE (user_id, task_id, date)
    completion_keys: HashSet<(UserId, TaskId, NaiveDate)>,

    badges: BTreeMap<i64, Badge>,
    next_badge_id: i64,
    /// UNIQUE (user_id, badge_code)
    user_badges: BTreeMap<(UserId, String), DateTime<Utc>>,

    levels: HashMap<UserId, LevelStatus>,

    challenges: BTreeMap<ChallengeId, Challenge>,
    next_challenge_id: ChallengeId,
    /// UNIQUE (challenge_id, user_id)
    participants: BTreeMap<(ChallengeId, UserId), DateTime<Utc>>,

    feed: BTreeMap<FeedEventId, FeedRow>,
    next_feed_id: FeedEventId,
    likes: HashSet<(FeedEventId, UserId)>,
    comments: Vec<(i64, FeedEventId, UserId, String, DateTime<Utc>)>,

    rate_counters: HashMap<(String, String, i64), i64>,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn user_name(&self, id: UserId) -> Option<String> {
        self.users.get(&id).map(|u| u.name.clone())
    }
}

/// 인메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 완료 로그 수 (테스트 검증용)
    pub async fn completion_count(&self) -> usize {
        self.tables.lock().await.completions.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn upsert_user(
        &self,
        id: UserId,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        let user = t.users.entry(id).or_insert_with(|| User {
            id,
            name: DEFAULT_USER_NAME.to_string(),
            created_at: now,
        });
        if let Some(name) = name {
            user.name = name.to_string();
        }
        Ok(user.clone())
    }

    async fn ensure_user(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        t.users.entry(id).or_insert_with(|| User {
            id,
            name: DEFAULT_USER_NAME.to_string(),
            created_at: now,
        });
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn insert_task(&self, task: &NewTask, now: DateTime<Utc>) -> StoreResult<Task> {
        let mut t = self.tables.lock().await;
        let id = Tables::next_id(&mut t.next_task_id);
        let task = Task {
            id,
            title: task.title.clone(),
            i18n: task.i18n.clone(),
            points: task.points,
            active: task.active,
            expires_at: task.expires_at,
            created_at: now,
        };
        t.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tables.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.tables.lock().await.tasks.values().cloned().collect())
    }

    async fn insert_completion(
        &self,
        user_id: UserId,
        task_id: TaskId,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let mut t = self.tables.lock().await;
        if !t.tasks.contains_key(&task_id) {
            return Err(StoreError::Corrupt(format!(
                "completion references missing task {}",
                task_id
            )));
        }
        if !t.completion_keys.insert((user_id, task_id, date)) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        t.completions.push(CompletionRow { user_id, task_id, date, at });
        Ok(InsertOutcome::Inserted)
    }

    async fn user_completions(&self, user_id: UserId) -> StoreResult<Vec<CompletionFact>> {
        let t = self.tables.lock().await;
        let mut facts: Vec<CompletionFact> = t
            .completions
            .iter()
            .filter(|row| row.user_id == user_id)
            .filter_map(|row| {
                t.tasks.get(&row.task_id).map(|task| CompletionFact {
                    task_id: row.task_id,
                    title: task.title.clone(),
                    points: task.points,
                    log_date: row.date,
                    completed_at: row.at,
                })
            })
            .collect();
        facts.sort_by(|a, b| {
            b.log_date
                .cmp(&a.log_date)
                .then(b.completed_at.cmp(&a.completed_at))
        });
        Ok(facts)
    }

    async fn daily_activity(
        &self,
        day: NaiveDate,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> StoreResult<DailyActivity> {
        let t = self.tables.lock().await;
        let todays: Vec<&CompletionRow> = t.completions.iter().filter(|c| c.date == day).collect();
        let active: HashSet<UserId> = todays.iter().map(|c| c.user_id).collect();
        let new_users = t
            .users
            .values()
            .filter(|u| u.created_at >= day_start && u.created_at < day_end)
            .count();

        Ok(DailyActivity {
            active_users: active.len() as i64,
            new_users: new_users as i64,
            completions: todays.len() as i64,
            total_users: t.users.len() as i64,
        })
    }

    async fn insert_badge(&self, badge: &NewBadge) -> StoreResult<Badge> {
        let mut t = self.tables.lock().await;
        // code 기준 upsert
        if let Some(existing) = t.badges.values_mut().find(|b| b.code == badge.code) {
            existing.title = badge.title.clone();
            existing.description = badge.description.clone();
            existing.rule = badge.rule;
            return Ok(existing.clone());
        }
        let id = Tables::next_id(&mut t.next_badge_id);
        let created = Badge {
            id,
            code: badge.code.clone(),
            title: badge.title.clone(),
            description: badge.description.clone(),
            rule: badge.rule,
        };
        t.badges.insert(id, created.clone());
        Ok(created)
    }

    async fn list_badges(&self) -> StoreResult<Vec<Badge>> {
        Ok(self.tables.lock().await.badges.values().cloned().collect())
    }

    async fn user_badges(&self, user_id: UserId) -> StoreResult<Vec<OwnedBadge>> {
        let t = self.tables.lock().await;
        let mut owned: Vec<OwnedBadge> = t
            .user_badges
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .filter_map(|((_, code), unlocked_at)| {
                t.badges.values().find(|b| &b.code == code).map(|badge| OwnedBadge {
                    badge: badge.clone(),
                    unlocked_at: *unlocked_at,
                })
            })
            .collect();
        owned.sort_by(|a, b| b.unlocked_at.cmp(&a.unlocked_at));
        Ok(owned)
    }

    async fn grant_badge(
        &self,
        user_id: UserId,
        badge_code: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let mut t = self.tables.lock().await;
        let key = (user_id, badge_code.to_string());
        if t.user_badges.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        t.user_badges.insert(key, at);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_level_status(&self, user_id: UserId) -> StoreResult<Option<LevelStatus>> {
        Ok(self.tables.lock().await.levels.get(&user_id).cloned())
    }

    async fn upsert_level_status(
        &self,
        user_id: UserId,
        level: &str,
        total_points: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<LevelStatus> {
        let mut t = self.tables.lock().await;
        let status = t.levels.entry(user_id).or_insert_with(|| LevelStatus {
            user_id,
            level: level.to_string(),
            total_points,
            updated_at: at,
        });
        if status.total_points <= total_points {
            status.level = level.to_string();
            status.total_points = total_points;
            status.updated_at = at;
        }
        Ok(status.clone())
    }

    async fn insert_challenge(
        &self,
        challenge: &NewChallenge,
        now: DateTime<Utc>,
    ) -> StoreResult<Challenge> {
        let mut t = self.tables.lock().await;
        if t.challenges.values().any(|c| c.code == challenge.code) {
            return Err(StoreError::Conflict(format!(
                "challenge code '{}' already exists",
                challenge.code
            )));
        }
        let id = Tables::next_id(&mut t.next_challenge_id);
        let mut task_ids = challenge.task_ids.clone();
        task_ids.sort_unstable();
        task_ids.dedup();
        let created = Challenge {
            id,
            code: challenge.code.clone(),
            title: challenge.title.clone(),
            description: challenge.description.clone(),
            start_date: challenge.start_date,
            end_date: challenge.end_date,
            status: challenge.status.clone(),
            task_ids,
            created_at: now,
        };
        t.challenges.insert(id, created.clone());
        Ok(created)
    }

    async fn get_challenge(&self, id: ChallengeId) -> StoreResult<Option<Challenge>> {
        Ok(self.tables.lock().await.challenges.get(&id).cloned())
    }

    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>> {
        Ok(self.tables.lock().await.challenges.values().rev().cloned().collect())
    }

    async fn user_challenge_ids(&self, user_id: UserId) -> StoreResult<Vec<ChallengeId>> {
        let t = self.tables.lock().await;
        Ok(t
            .participants
            .keys()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(cid, _)| *cid)
            .collect())
    }

    async fn join_challenge(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let mut t = self.tables.lock().await;
        if t.participants.contains_key(&(challenge_id, user_id)) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        t.participants.insert((challenge_id, user_id), at);
        Ok(InsertOutcome::Inserted)
    }

    async fn challenge_completions(
        &self,
        challenge: &Challenge,
    ) -> StoreResult<Vec<ScopedCompletion>> {
        let t = self.tables.lock().await;
        Ok(t
            .completions
            .iter()
            .filter(|c| t.participants.contains_key(&(challenge.id, c.user_id)))
            .filter(|c| challenge.covers(c.date, c.task_id))
            .filter_map(|c| {
                t.tasks.get(&c.task_id).map(|task| ScopedCompletion {
                    user_id: c.user_id,
                    name: t.user_name(c.user_id),
                    points: task.points,
                })
            })
            .collect())
    }

    async fn insert_feed_event(
        &self,
        event: &NewFeedEvent,
        at: DateTime<Utc>,
    ) -> StoreResult<FeedEventId> {
        let mut t = self.tables.lock().await;
        let id = Tables::next_id(&mut t.next_feed_id);
        t.feed.insert(
            id,
            FeedRow {
                user_id: event.user_id,
                kind: event.kind.clone(),
                message: event.message.clone(),
                meta_json: event.meta_json.clone(),
                created_at: at,
            },
        );
        Ok(id)
    }

    async fn list_feed(&self, limit: i64) -> StoreResult<Vec<FeedEvent>> {
        let t = self.tables.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(t
            .feed
            .iter()
            .rev()
            .take(limit)
            .map(|(id, row)| FeedEvent {
                id: *id,
                user_id: row.user_id,
                name: t.user_name(row.user_id),
                kind: row.kind.clone(),
                message: row.message.clone(),
                meta_json: row.meta_json.clone(),
                created_at: row.created_at,
                like_count: t.likes.iter().filter(|(fid, _)| fid == id).count() as i64,
                comment_count: t.comments.iter().filter(|c| c.1 == *id).count() as i64,
            })
            .collect())
    }

    async fn feed_event_exists(&self, id: FeedEventId) -> StoreResult<bool> {
        Ok(self.tables.lock().await.feed.contains_key(&id))
    }

    async fn like_feed_event(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        _at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let mut t = self.tables.lock().await;
        if t.likes.insert((feed_id, user_id)) {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn insert_feed_comment(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let mut t = self.tables.lock().await;
        let id = t.comments.len() as i64 + 1;
        t.comments.push((id, feed_id, user_id, text.to_string(), at));
        Ok(id)
    }

    async fn increment_rate_counter(
        &self,
        identity: &str,
        action: &str,
        window_id: i64,
    ) -> StoreResult<i64> {
        let mut t = self.tables.lock().await;
        let oldest = window_id.saturating_sub(1);
        t.rate_counters.retain(|(_, _, window), _| *window >= oldest);

        let count = t
            .rate_counters
            .entry((identity.to_string(), action.to_string(), window_id))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

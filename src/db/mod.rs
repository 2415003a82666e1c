//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 완료 로그의 "하루 한 번" 은 어디서 보장하는가?
//! A: `completion_logs` 의 UNIQUE (user_id, task_id, log_date) 제약
//!
//!    ```sql
//!    INSERT INTO completion_logs (...) VALUES (...)
//!    ON CONFLICT ON CONSTRAINT uniq_user_task_day DO NOTHING
//!    ```
//!
//!    - 영향받은 행 0 → 중복 (duplicate=true)
//!    - 애플리케이션의 "조회 후 삽입" 경쟁 조건 없음
//!
//! Q: 총 포인트를 캐시 컬럼으로 두지 않는 이유는?
//! A: 로그가 단일 진실 공급원 (Single Source of Truth)
//!    - SUM(points) 를 매번 계산 → 롤업과 로그가 어긋날 일 없음
//!    - leafpass_status.total_points 는 "레벨 계산 근거" 기록일 뿐
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - acquire 타임아웃 → `StoreError::Transient`

pub mod memory;
mod models;
mod repository;
pub mod seed;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgQueryResult, FromRow, PgPool};

pub use memory::MemoryStore;
pub use models::*;
pub use repository::Store;

use crate::error::{StoreError, StoreResult};
use crate::types::{ChallengeId, FeedEventId, TaskId, UserId};

/// PostgreSQL 저장소
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    async fn task_ids_for(&self, challenge_ids: &[ChallengeId]) -> StoreResult<HashMap<ChallengeId, Vec<TaskId>>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT challenge_id, task_id
            FROM challenge_tasks
            WHERE challenge_id = ANY($1)
            ORDER BY challenge_id, task_id
            "#
        )
        .bind(challenge_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_challenge: HashMap<ChallengeId, Vec<TaskId>> = HashMap::new();
        for (challenge_id, task_id) in rows {
            by_challenge.entry(challenge_id).or_default().push(task_id);
        }
        Ok(by_challenge)
    }
}

/// ON CONFLICT DO NOTHING 결과 → InsertOutcome
///
/// 제약 위반 에러가 올라오는 경우(경합)도 AlreadyExists 로 취급
fn insert_outcome(result: Result<PgQueryResult, sqlx::Error>) -> StoreResult<InsertOutcome> {
    match result {
        Ok(done) if done.rows_affected() > 0 => Ok(InsertOutcome::Inserted),
        Ok(_) => Ok(InsertOutcome::AlreadyExists),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(InsertOutcome::AlreadyExists)
        }
        Err(err) => Err(err.into()),
    }
}

fn encode_i18n(i18n: &HashMap<String, String>) -> StoreResult<Option<String>> {
    if i18n.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(i18n)
        .map(Some)
        .map_err(|e| StoreError::Corrupt(format!("i18n encode: {}", e)))
}

/// user_badges ⨝ badges
#[derive(Debug, FromRow)]
struct OwnedBadgeRow {
    id: i64,
    code: String,
    title: String,
    description: Option<String>,
    rule_type: String,
    threshold: i64,
    unlocked_at: DateTime<Utc>,
}

const TASK_COLUMNS: &str = "id, title, i18n_json, points, active, expires_at, created_at";
const CHALLENGE_COLUMNS: &str =
    "id, code, title, description, start_date, end_date, status, created_at";

#[async_trait]
impl Store for Database {
    /// Health check
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ============ Users ============

    async fn upsert_user(
        &self,
        id: UserId,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, created_at)
            VALUES ($1, COALESCE($2::TEXT, $4), $3)
            ON CONFLICT (id)
            DO UPDATE SET name = COALESCE($2::TEXT, users.name)
            RETURNING id, name, created_at
            "#
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(DEFAULT_USER_NAME)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn ensure_user(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#
        )
        .bind(id)
        .bind(DEFAULT_USER_NAME)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, name, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // ============ Tasks ============

    async fn insert_task(&self, task: &NewTask, now: DateTime<Utc>) -> StoreResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            INSERT INTO tasks (title, i18n_json, points, active, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.title)
        .bind(encode_i18n(&task.i18n)?)
        .bind(task.points)
        .bind(task.active)
        .bind(task.expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    // ============ Completion Log ============

    async fn insert_completion(
        &self,
        user_id: UserId,
        task_id: TaskId,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO completion_logs (user_id, task_id, log_date, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT uniq_user_task_day DO NOTHING
            "#
        )
        .bind(user_id)
        .bind(task_id)
        .bind(date)
        .bind(at)
        .execute(&self.pool)
        .await;

        insert_outcome(result)
    }

    async fn user_completions(&self, user_id: UserId) -> StoreResult<Vec<CompletionFact>> {
        let facts = sqlx::query_as::<_, CompletionFact>(
            r#"
            SELECT
                l.task_id,
                t.title,
                t.points,
                l.log_date,
                l.created_at AS completed_at
            FROM completion_logs l
            JOIN tasks t ON t.id = l.task_id
            WHERE l.user_id = $1
            ORDER BY l.log_date DESC, l.created_at DESC
            "#
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(facts)
    }

    async fn daily_activity(
        &self,
        day: NaiveDate,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> StoreResult<DailyActivity> {
        let activity = sqlx::query_as::<_, DailyActivity>(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT user_id) FROM completion_logs WHERE log_date = $1) AS active_users,
                (SELECT COUNT(*) FROM users WHERE created_at >= $2 AND created_at < $3) AS new_users,
                (SELECT COUNT(*) FROM completion_logs WHERE log_date = $1) AS completions,
                (SELECT COUNT(*) FROM users) AS total_users
            "#
        )
        .bind(day)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(activity)
    }

    // ============ Badges ============

    async fn insert_badge(&self, badge: &NewBadge) -> StoreResult<Badge> {
        let row = sqlx::query_as::<_, BadgeRow>(
            r#"
            INSERT INTO badges (code, title, description, rule_type, threshold)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code)
            DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                rule_type = EXCLUDED.rule_type,
                threshold = EXCLUDED.threshold
            RETURNING id, code, title, description, rule_type, threshold
            "#
        )
        .bind(&badge.code)
        .bind(&badge.title)
        .bind(&badge.description)
        .bind(badge.rule.rule_type())
        .bind(badge.rule.threshold())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_badges(&self) -> StoreResult<Vec<Badge>> {
        let rows = sqlx::query_as::<_, BadgeRow>(
            "SELECT id, code, title, description, rule_type, threshold FROM badges ORDER BY id ASC"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Badge::try_from).collect()
    }

    async fn user_badges(&self, user_id: UserId) -> StoreResult<Vec<OwnedBadge>> {
        let rows = sqlx::query_as::<_, OwnedBadgeRow>(
            r#"
            SELECT b.id, b.code, b.title, b.description, b.rule_type, b.threshold, ub.unlocked_at
            FROM user_badges ub
            JOIN badges b ON b.code = ub.badge_code
            WHERE ub.user_id = $1
            ORDER BY ub.unlocked_at DESC
            "#
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let unlocked_at = row.unlocked_at;
                let badge = Badge::try_from(BadgeRow {
                    id: row.id,
                    code: row.code,
                    title: row.title,
                    description: row.description,
                    rule_type: row.rule_type,
                    threshold: row.threshold,
                })?;
                Ok(OwnedBadge { badge, unlocked_at })
            })
            .collect()
    }

    async fn grant_badge(
        &self,
        user_id: UserId,
        badge_code: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badges (user_id, badge_code, unlocked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, badge_code) DO NOTHING
            "#
        )
        .bind(user_id)
        .bind(badge_code)
        .bind(at)
        .execute(&self.pool)
        .await;

        insert_outcome(result)
    }

    // ============ LeafPass ============

    async fn get_level_status(&self, user_id: UserId) -> StoreResult<Option<LevelStatus>> {
        let status = sqlx::query_as::<_, LevelStatus>(
            "SELECT user_id, level, total_points, updated_at FROM leafpass_status WHERE user_id = $1"
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    /// 단일 문장 조건부 upsert
    ///
    /// WHERE 절이 거짓이면 (더 큰 total 이 이미 저장됨) RETURNING 이 비어 있음 → 현재 행 조회
    async fn upsert_level_status(
        &self,
        user_id: UserId,
        level: &str,
        total_points: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<LevelStatus> {
        let written = sqlx::query_as::<_, LevelStatus>(
            r#"
            INSERT INTO leafpass_status (user_id, level, total_points, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET
                level = EXCLUDED.level,
                total_points = EXCLUDED.total_points,
                updated_at = EXCLUDED.updated_at
            WHERE leafpass_status.total_points <= EXCLUDED.total_points
            RETURNING user_id, level, total_points, updated_at
            "#
        )
        .bind(user_id)
        .bind(level)
        .bind(total_points)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match written {
            Some(status) => Ok(status),
            None => self
                .get_level_status(user_id)
                .await?
                .ok_or_else(|| StoreError::Corrupt(format!("leafpass row for {} vanished", user_id))),
        }
    }

    // ============ Challenges ============

    async fn insert_challenge(
        &self,
        challenge: &NewChallenge,
        now: DateTime<Utc>,
    ) -> StoreResult<Challenge> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ChallengeRow>(&format!(
            r#"
            INSERT INTO challenges (code, title, description, start_date, end_date, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(&challenge.code)
        .bind(&challenge.title)
        .bind(&challenge.description)
        .bind(challenge.start_date)
        .bind(challenge.end_date)
        .bind(&challenge.status)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict(
                format!("challenge code '{}' already exists", challenge.code),
            ),
            other => other.into(),
        })?;

        let mut task_ids = challenge.task_ids.clone();
        task_ids.sort_unstable();
        task_ids.dedup();
        for task_id in &task_ids {
            sqlx::query(
                "INSERT INTO challenge_tasks (challenge_id, task_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            )
            .bind(row.id)
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row.with_tasks(task_ids))
    }

    async fn get_challenge(&self, id: ChallengeId) -> StoreResult<Option<Challenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut tasks = self.task_ids_for(&[id]).await?;
        Ok(Some(row.with_tasks(tasks.remove(&id).unwrap_or_default())))
    }

    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>> {
        let rows = sqlx::query_as::<_, ChallengeRow>(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<ChallengeId> = rows.iter().map(|r| r.id).collect();
        let mut tasks = self.task_ids_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let task_ids = tasks.remove(&row.id).unwrap_or_default();
                row.with_tasks(task_ids)
            })
            .collect())
    }

    async fn user_challenge_ids(&self, user_id: UserId) -> StoreResult<Vec<ChallengeId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT challenge_id FROM challenge_participants WHERE user_id = $1"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn join_challenge(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_participants (challenge_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (challenge_id, user_id) DO NOTHING
            "#
        )
        .bind(challenge_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await;

        insert_outcome(result)
    }

    async fn challenge_completions(
        &self,
        challenge: &Challenge,
    ) -> StoreResult<Vec<ScopedCompletion>> {
        let rows = sqlx::query_as::<_, ScopedCompletion>(
            r#"
            SELECT l.user_id, u.name AS name, t.points
            FROM completion_logs l
            JOIN challenge_participants p
                ON p.challenge_id = $1 AND p.user_id = l.user_id
            JOIN challenge_tasks ct
                ON ct.challenge_id = $1 AND ct.task_id = l.task_id
            JOIN tasks t ON t.id = l.task_id
            LEFT JOIN users u ON u.id = l.user_id
            WHERE l.log_date >= $2 AND l.log_date <= $3
            "#
        )
        .bind(challenge.id)
        .bind(challenge.start_date)
        .bind(challenge.end_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============ Activity Feed ============

    async fn insert_feed_event(
        &self,
        event: &NewFeedEvent,
        at: DateTime<Utc>,
    ) -> StoreResult<FeedEventId> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO activity_feed (user_id, kind, message, meta_json, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#
        )
        .bind(event.user_id)
        .bind(&event.kind)
        .bind(&event.message)
        .bind(&event.meta_json)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_feed(&self, limit: i64) -> StoreResult<Vec<FeedEvent>> {
        let events = sqlx::query_as::<_, FeedEvent>(
            r#"
            SELECT
                f.id,
                f.user_id,
                u.name AS name,
                f.kind,
                f.message,
                f.meta_json,
                f.created_at,
                (SELECT COUNT(*) FROM feed_likes fl WHERE fl.feed_id = f.id) AS like_count,
                (SELECT COUNT(*) FROM feed_comments fc WHERE fc.feed_id = f.id) AS comment_count
            FROM activity_feed f
            LEFT JOIN users u ON u.id = f.user_id
            ORDER BY f.id DESC
            LIMIT $1
            "#
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn feed_event_exists(&self, id: FeedEventId) -> StoreResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM activity_feed WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn like_feed_event(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO feed_likes (feed_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (feed_id, user_id) DO NOTHING
            "#
        )
        .bind(feed_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await;

        insert_outcome(result)
    }

    async fn insert_feed_comment(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_comments (feed_id, user_id, text, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#
        )
        .bind(feed_id)
        .bind(user_id)
        .bind(text)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    // ============ Rate Limit ============

    async fn increment_rate_counter(
        &self,
        identity: &str,
        action: &str,
        window_id: i64,
    ) -> StoreResult<i64> {
        sqlx::query("DELETE FROM rate_limits WHERE window_id < $1")
            .bind(window_id.saturating_sub(1))
            .execute(&self.pool)
            .await?;

        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO rate_limits (identity, action, window_id, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (identity, action, window_id)
            DO UPDATE SET count = rate_limits.count + 1
            RETURNING count
            "#
        )
        .bind(identity)
        .bind(action)
        .bind(window_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_i18n_is_stored_as_null() {
        assert_eq!(encode_i18n(&HashMap::new()).unwrap(), None);

        let mut i18n = HashMap::new();
        i18n.insert("zh".to_string(), "步行".to_string());
        let encoded = encode_i18n(&i18n).unwrap().unwrap();
        assert_eq!(encoded, r#"{"zh":"步行"}"#);
    }

    #[test]
    fn test_non_unique_errors_propagate() {
        let outcome = insert_outcome(Err(sqlx::Error::PoolTimedOut));
        assert!(matches!(outcome, Err(StoreError::Transient(_))));
    }
}

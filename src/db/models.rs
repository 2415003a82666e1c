//! Database Models
//!
//! Records owned by the store. The completion log is the single source of
//! truth; stats, levels and leaderboards are folds over it.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use crate::error::StoreError;
use crate::types::{BadgeRule, ChallengeId, FeedEventId, TaskId, UserId};

/// 새 사용자 기본 표시 이름
pub const DEFAULT_USER_NAME: &str = "Telegram User";

/// 사용자
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    /// Telegram ID
    pub id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// 퀘스트 (카탈로그 항목)
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// 언어 코드 → 제목
    pub i18n: HashMap<String, String>,
    pub points: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// 활성 상태이고 만료되지 않았는지
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expires| expires > now)
    }

    /// 요청 언어에 맞는 제목
    ///
    /// "zh-CN" 처럼 지역 코드가 붙은 경우 "zh" 로도 찾아봄
    pub fn title_for(&self, lang: Option<&str>) -> &str {
        let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
            return &self.title;
        };
        let lang = lang.to_lowercase();
        let primary = lang.split(['-', '_']).next().unwrap_or(&lang);

        self.i18n
            .iter()
            .find(|(key, _)| key.to_lowercase() == lang)
            .or_else(|| self.i18n.iter().find(|(key, _)| key.to_lowercase() == primary))
            .map(|(_, title)| title.as_str())
            .filter(|title| !title.is_empty())
            .unwrap_or(&self.title)
    }
}

/// tasks 테이블 행 (i18n_json 은 TEXT 로 저장)
#[derive(Debug, FromRow)]
pub(crate) struct TaskRow {
    pub id: i64,
    pub title: String,
    pub i18n_json: Option<String>,
    pub points: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let i18n = match row.i18n_json.as_deref() {
            None | Some("") => HashMap::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                StoreError::Corrupt(format!("task {} i18n_json: {}", row.id, e))
            })?,
        };
        Ok(Task {
            id: row.id,
            title: row.title,
            i18n,
            points: row.points,
            active: row.active,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

/// 퀘스트 생성 입력 (관리자)
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub i18n: HashMap<String, String>,
    pub points: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, points: i64) -> Self {
        Self {
            title: title.into(),
            i18n: HashMap::new(),
            points,
            active: true,
            expires_at: None,
        }
    }
}

/// 완료 로그 + 퀘스트 정보 (조인 결과)
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CompletionFact {
    pub task_id: TaskId,
    pub title: String,
    pub points: i64,
    pub log_date: NaiveDate,
    pub completed_at: DateTime<Utc>,
}

/// 유니크 제약이 걸린 insert 의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// 같은 키가 이미 존재 (제약 위반 → 멱등 no-op)
    AlreadyExists,
}

impl InsertOutcome {
    pub fn inserted(self) -> bool {
        self == InsertOutcome::Inserted
    }
}

/// 배지 카탈로그 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub rule: BadgeRule,
}

#[derive(Debug, FromRow)]
pub(crate) struct BadgeRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub threshold: i64,
}

impl TryFrom<BadgeRow> for Badge {
    type Error = StoreError;

    fn try_from(row: BadgeRow) -> Result<Self, Self::Error> {
        let rule = BadgeRule::from_parts(&row.rule_type, row.threshold)
            .map_err(|e| StoreError::Corrupt(format!("badge {}: {}", row.code, e)))?;
        Ok(Badge {
            id: row.id,
            code: row.code,
            title: row.title,
            description: row.description,
            rule,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewBadge {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub rule: BadgeRule,
}

/// 사용자가 획득한 배지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedBadge {
    pub badge: Badge,
    pub unlocked_at: DateTime<Utc>,
}

/// LeafPass 레벨 상태
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LevelStatus {
    pub user_id: UserId,
    pub level: String,
    pub total_points: i64,
    pub updated_at: DateTime<Utc>,
}

/// 챌린지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: ChallengeId,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    /// 시작일 (포함)
    pub start_date: NaiveDate,
    /// 종료일 (포함)
    pub end_date: NaiveDate,
    pub status: String,
    pub task_ids: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn covers(&self, date: NaiveDate, task_id: TaskId) -> bool {
        self.start_date <= date && date <= self.end_date && self.task_ids.contains(&task_id)
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ChallengeRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ChallengeRow {
    pub fn with_tasks(self, task_ids: Vec<TaskId>) -> Challenge {
        Challenge {
            id: self.id,
            code: self.code,
            title: self.title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            task_ids,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub task_ids: Vec<TaskId>,
}

/// 챌린지 범위에 들어오는 완료 한 건 (참가자 한정)
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ScopedCompletion {
    pub user_id: UserId,
    pub name: Option<String>,
    pub points: i64,
}

/// 활동 피드 이벤트
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FeedEvent {
    pub id: FeedEventId,
    pub user_id: UserId,
    pub name: Option<String>,
    pub kind: String,
    pub message: String,
    pub meta_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewFeedEvent {
    pub user_id: UserId,
    pub kind: String,
    pub message: String,
    pub meta_json: Option<String>,
}

/// 하루 활동 집계 (관리자 대시보드)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct DailyActivity {
    pub active_users: i64,
    pub new_users: i64,
    pub completions: i64,
    pub total_users: i64,
}

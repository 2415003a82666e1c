//! Activity Feed
//!
//! 완료/배지 이벤트 기록, 좋아요, 댓글.
//! 이벤트 기록은 부수 효과라 실패해도 호출자에게 전파하지 않음.

use std::sync::Arc;

use crate::clock::Calendar;
use crate::db::{Badge, FeedEvent, NewFeedEvent, Store, Task};
use crate::error::ServiceError;
use crate::types::{FeedEventId, UserId};

/// 댓글 최대 길이 (문자 수)
pub const MAX_COMMENT_CHARS: usize = 500;

pub const KIND_COMPLETION: &str = "task_completed";
pub const KIND_BADGE: &str = "badge_unlocked";

/// 퀘스트 완료 이벤트
pub fn completion_event(user_id: UserId, task: &Task) -> NewFeedEvent {
    NewFeedEvent {
        user_id,
        kind: KIND_COMPLETION.to_string(),
        message: format!("completed \"{}\" (+{} pts)", task.title, task.points),
        meta_json: Some(serde_json::json!({ "task_id": task.id, "points": task.points }).to_string()),
    }
}

/// 배지 획득 이벤트
pub fn badge_event(user_id: UserId, badge: &Badge) -> NewFeedEvent {
    NewFeedEvent {
        user_id,
        kind: KIND_BADGE.to_string(),
        message: format!("unlocked the \"{}\" badge", badge.title),
        meta_json: Some(serde_json::json!({ "badge": badge.code }).to_string()),
    }
}

/// 공백 제거 후 최대 길이로 자름. 비어 있으면 None
pub fn normalize_comment(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_COMMENT_CHARS).collect())
}

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl FeedService {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// best-effort 기록
    pub async fn record(&self, event: NewFeedEvent) {
        if let Err(e) = self.store.insert_feed_event(&event, self.calendar.now()).await {
            tracing::warn!(user_id = event.user_id, kind = %event.kind, error = %e, "Feed event dropped");
        }
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<FeedEvent>, ServiceError> {
        Ok(self.store.list_feed(limit).await?)
    }

    /// 좋아요 (멱등). 이번 호출로 새로 눌렸는지 반환
    pub async fn like(&self, feed_id: FeedEventId, user_id: UserId) -> Result<bool, ServiceError> {
        self.ensure_event(feed_id).await?;
        let now = self.calendar.now();
        self.store.ensure_user(user_id, now).await?;
        let outcome = self.store.like_feed_event(feed_id, user_id, now).await?;
        Ok(outcome.inserted())
    }

    /// 댓글 작성
    pub async fn comment(
        &self,
        feed_id: FeedEventId,
        user_id: UserId,
        text: &str,
    ) -> Result<i64, ServiceError> {
        let text = normalize_comment(text)
            .ok_or_else(|| ServiceError::Invalid("comment text is empty".to_string()))?;
        self.ensure_event(feed_id).await?;

        let now = self.calendar.now();
        self.store.ensure_user(user_id, now).await?;
        Ok(self.store.insert_feed_comment(feed_id, user_id, &text, now).await?)
    }

    async fn ensure_event(&self, feed_id: FeedEventId) -> Result<(), ServiceError> {
        if self.store.feed_event_exists(feed_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Feed event"))
        }
    }
}

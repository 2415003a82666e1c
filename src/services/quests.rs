//! Quest catalog
//!
//! 현재 노출 가능한 퀘스트 조회, 관리자 퀘스트 생성

use std::sync::Arc;

use crate::clock::Calendar;
use crate::db::{NewTask, Store, Task};
use crate::error::ServiceError;

/// 퀘스트 하나의 최대 포인트 (마이그레이션의 CHECK 와 동일)
pub const MAX_TASK_POINTS: i64 = 1_000_000;

#[derive(Clone)]
pub struct QuestCatalog {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl QuestCatalog {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// active 이고 만료되지 않은 퀘스트 (id 오름차순)
    pub async fn available(&self) -> Result<Vec<Task>, ServiceError> {
        let now = self.calendar.now();
        let mut tasks = self.store.list_tasks().await?;
        tasks.retain(|task| task.is_available(now));
        Ok(tasks)
    }

    pub async fn create(&self, mut task: NewTask) -> Result<Task, ServiceError> {
        task.title = task.title.trim().to_string();
        if task.title.is_empty() {
            return Err(ServiceError::Invalid("title is required".to_string()));
        }
        if !(0..=MAX_TASK_POINTS).contains(&task.points) {
            return Err(ServiceError::Invalid(format!(
                "points must be between 0 and {MAX_TASK_POINTS}"
            )));
        }
        task.i18n.retain(|lang, title| !lang.trim().is_empty() && !title.trim().is_empty());

        let created = self.store.insert_task(&task, self.calendar.now()).await?;
        tracing::info!(task_id = created.id, points = created.points, "Quest created");
        Ok(created)
    }
}

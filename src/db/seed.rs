//! Demo catalog seeding
//!
//! 개발 환경에서 빈 저장소로 시작할 때 샘플 퀘스트/배지/챌린지를 채움.
//! 배지는 code 기준 upsert 라 재실행해도 안전하고, 퀘스트는 카탈로그가 비어 있을 때만 추가됨.

use std::collections::HashMap;

use chrono::Duration;

use super::models::{NewBadge, NewChallenge, NewTask};
use super::repository::Store;
use crate::clock::Calendar;
use crate::error::{StoreError, StoreResult};
use crate::types::BadgeRule;

/// (title, zh title, points)
const DEMO_TASKS: [(&str, &str, i64); 5] = [
    ("Walk 5000 steps", "今天步行 5000 步以上", 10),
    ("Bring your own cup", "自带水杯", 10),
    ("Take public transport", "乘坐公共交通", 15),
    ("Sort your recycling", "垃圾分类", 10),
    ("Meat-free meal", "吃一顿素食", 20),
];

/// (code, title, description, rule)
const DEMO_BADGES: [(&str, &str, &str, BadgeRule); 6] = [
    ("first_step", "First Step", "Complete your first quest", BadgeRule::TotalCompletions(1)),
    ("streak_3", "On a Roll", "Three days in a row", BadgeRule::Streak(3)),
    ("streak_7", "Green Week", "Seven days in a row", BadgeRule::Streak(7)),
    ("points_100", "Sprouting", "Earn 100 points", BadgeRule::TotalPoints(100)),
    ("points_500", "Tree Hugger", "Earn 500 points", BadgeRule::TotalPoints(500)),
    ("days_10", "Regular", "Take part on 10 different days", BadgeRule::ParticipationDays(10)),
];

const DEMO_CHALLENGE_CODE: &str = "green_month";

/// 샘플 데이터 채우기
///
/// 데모 챌린지는 설정 타임존의 오늘부터 30일
pub async fn seed_catalog(store: &dyn Store, calendar: &Calendar) -> StoreResult<()> {
    let now = calendar.now();

    for (code, title, description, rule) in DEMO_BADGES {
        store
            .insert_badge(&NewBadge {
                code: code.to_string(),
                title: title.to_string(),
                description: Some(description.to_string()),
                rule,
            })
            .await?;
    }

    if !store.list_tasks().await?.is_empty() {
        tracing::debug!("Task catalog already present, skipping demo tasks");
        return Ok(());
    }

    let mut task_ids = Vec::with_capacity(DEMO_TASKS.len());
    for (title, zh, points) in DEMO_TASKS {
        let mut task = NewTask::new(title, points);
        task.i18n = HashMap::from([("zh".to_string(), zh.to_string())]);
        task_ids.push(store.insert_task(&task, now).await?.id);
    }

    let start = calendar.today();
    let challenge = NewChallenge {
        code: DEMO_CHALLENGE_CODE.to_string(),
        title: "Green Month".to_string(),
        description: Some("Thirty days of small green habits".to_string()),
        start_date: start,
        end_date: start + Duration::days(29),
        status: "active".to_string(),
        task_ids,
    };
    match store.insert_challenge(&challenge, now).await {
        Ok(_) | Err(StoreError::Conflict(_)) => {}
        Err(e) => return Err(e),
    }

    tracing::info!(
        tasks = DEMO_TASKS.len(),
        badges = DEMO_BADGES.len(),
        "Seeded demo catalog"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        let store = MemoryStore::new();
        let calendar = Calendar::utc(Arc::new(FixedClock::new(Utc::now())));

        seed_catalog(&store, &calendar).await.unwrap();
        seed_catalog(&store, &calendar).await.unwrap();

        assert_eq!(store.list_tasks().await.unwrap().len(), DEMO_TASKS.len());
        assert_eq!(store.list_badges().await.unwrap().len(), DEMO_BADGES.len());

        let challenges = store.list_challenges().await.unwrap();
        assert_eq!(challenges.len(), 1);
        assert_eq!(challenges[0].task_ids.len(), DEMO_TASKS.len());
    }

    #[tokio::test]
    async fn test_demo_challenge_starts_on_local_date() {
        let store = MemoryStore::new();
        // UTC 로는 1월 1일, 상하이에서는 이미 1월 2일
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let calendar = Calendar::new(Arc::new(FixedClock::new(now)), chrono_tz::Asia::Shanghai);

        seed_catalog(&store, &calendar).await.unwrap();

        let challenge = &store.list_challenges().await.unwrap()[0];
        assert_eq!(challenge.start_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(challenge.end_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }
}

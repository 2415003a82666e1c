//! Rate Limiter
//!
//! # Interview Q&A
//!
//! Q: 고정 윈도우 카운터를 어떻게 원자적으로 증가시키는가?
//! A: (identity, action, window_id) 키에 insert-or-increment 한 문장
//!
//!    ```sql
//!    INSERT INTO rate_limits (...) VALUES (..., 1)
//!    ON CONFLICT (identity, action, window_id)
//!    DO UPDATE SET count = rate_limits.count + 1
//!    RETURNING count
//!    ```
//!
//!    window_id = floor(unix_time / window_secs)
//!
//! Q: 락 경합으로 실패하면?
//! A: `StoreError::Transient` 만 재시도 (최대 5회, 50ms × 시도 횟수 backoff).
//!    그 외 에러와 마지막 실패는 그대로 전파

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Calendar;
use crate::db::Store;
use crate::error::{ServiceError, StoreResult};

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Transient 에러 재시도
pub async fn retry_transient<T, F, Fut>(mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Transient store error, retrying");
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    calendar: Calendar,
    max_requests: i64,
    window_secs: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, calendar: Calendar, max_requests: i64, window_secs: i64) -> Self {
        Self {
            store,
            calendar,
            max_requests,
            window_secs: window_secs.max(1),
        }
    }

    /// 허용이면 Ok, 초과면 RateLimited
    pub async fn check(&self, identity: &str, action: &str) -> Result<(), ServiceError> {
        let window_id = self.calendar.now().timestamp().div_euclid(self.window_secs);
        let store = &self.store;
        let count = retry_transient(move || store.increment_rate_counter(identity, action, window_id))
            .await?;

        if count > self.max_requests {
            tracing::warn!(identity, action, count, "Rate limit exceeded");
            return Err(ServiceError::RateLimited(action.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::MemoryStore;
    use crate::error::StoreError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter(max: i64) -> (Arc<FixedClock>, RateLimiter) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(store, Calendar::utc(clock.clone()), max, 60);
        (clock, limiter)
    }

    #[tokio::test]
    async fn test_limit_per_window() {
        let (clock, limiter) = limiter(2);

        tokio_test::assert_ok!(limiter.check("42", "init_user").await);
        tokio_test::assert_ok!(limiter.check("42", "init_user").await);
        assert!(matches!(
            limiter.check("42", "init_user").await,
            Err(ServiceError::RateLimited(_))
        ));

        // 다른 identity / action 은 별도 카운터
        tokio_test::assert_ok!(limiter.check("43", "init_user").await);
        tokio_test::assert_ok!(limiter.check("42", "feed_comment").await);

        clock.advance(chrono::Duration::seconds(60));
        tokio_test::assert_ok!(limiter.check("42", "init_user").await);
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(StoreError::Transient("database is locked".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = retry_transient(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Transient("locked".into())) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = retry_transient(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Corrupt("bad row".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Clock & Calendar
//!
//! "오늘"은 UTC가 아니라 서비스에 설정된 타임존 기준의 달력 날짜.
//! 완료 로그의 유니크 단위(user, task, date), 연속 일수 계산 모두 이 날짜를 사용함.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// 현재 시각 제공자 (테스트에서 고정 시각 주입)
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 수동으로 움직이는 시계
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    /// 해당 날짜 정오(UTC)로 고정
    pub fn at_noon(date: NaiveDate) -> Self {
        Self::new(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// 시계 + 타임존 → 달력 날짜
#[derive(Clone)]
pub struct Calendar {
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl Calendar {
    pub fn new(clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { clock, tz }
    }

    pub fn utc(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, Tz::UTC)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 설정 타임존 기준 오늘
    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// 로컬 날짜 하루의 [시작, 끝) 구간을 UTC 시각으로 반환
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.local_midnight(date);
        let end = date
            .succ_opt()
            .map(|next| self.local_midnight(next))
            .unwrap_or(start + Duration::days(1));
        (start, end)
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        // DST 전환으로 자정이 존재하지 않는 날은 UTC 자정으로 대체
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl std::fmt::Debug for Calendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calendar").field("tz", &self.tz).finish()
    }
}

//! GreenSphere API Library
//!
//! # Overview
//!
//! 이 라이브러리는 GreenSphere "green habits" 앱의 백엔드 API를 제공합니다.
//! 사용자는 Telegram Mini-App/봇으로 일일 퀘스트를 체크하고 포인트, 배지,
//! LeafPass 레벨을 얻으며 기간제 챌린지에 참가합니다.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │  │Services │  │   DB    │  │  Types  │    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘    │
//! │       │            │            │            │          │
//! │       └────────────┴────────────┴────────────┘          │
//! │                         │                                │
//! └─────────────────────────┼────────────────────────────────┘
//!                           │
//!                           ▼
//!              ┌────────────────────────┐
//!              │ PostgreSQL / In-memory │
//!              └────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `auth`: Telegram initData 검증, 요청 신원
//! - `clock`: 시계 + 타임존 달력
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (완료, 통계, 배지, 레벨, 챌린지)
//! - `db`: 저장소 (PostgreSQL, 인메모리)
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use greensphere_api::{clock::SystemClock, config::Config, db::MemoryStore, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(SystemClock),
//!         Arc::new(NoopNotifier),
//!         config,
//!     );
//!     let app = greensphere_api::routes::router(state);
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, MemoryStore, Store};
pub use error::ApiError;

use clock::{Calendar, Clock};
use services::{
    BadgeUnlocker, ChallengeService, CompletionEngine, FeedService, LeafPassService, Notifier,
    QuestCatalog, RateLimiter, StatsCalculator,
};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub calendar: Calendar,
    pub stats: StatsCalculator,
    pub completion: CompletionEngine,
    pub badges: BadgeUnlocker,
    pub leafpass: LeafPassService,
    pub challenges: ChallengeService,
    pub feed: FeedService,
    pub quests: QuestCatalog,
    pub rate_limiter: RateLimiter,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 저장소, 시계, 알림 채널로 서비스 그래프 구성
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        let calendar = Calendar::new(clock, config.timezone);

        let stats = StatsCalculator::new(store.clone(), calendar.clone());
        let badges = BadgeUnlocker::new(store.clone(), calendar.clone(), stats.clone());
        let leafpass = LeafPassService::new(store.clone(), calendar.clone());
        let feed = FeedService::new(store.clone(), calendar.clone());
        let completion = CompletionEngine::new(
            store.clone(),
            calendar.clone(),
            stats.clone(),
            badges.clone(),
            leafpass.clone(),
            feed.clone(),
            notifier.clone(),
        );
        let challenges = ChallengeService::new(store.clone(), calendar.clone());
        let quests = QuestCatalog::new(store.clone(), calendar.clone());
        let rate_limiter = RateLimiter::new(
            store.clone(),
            calendar.clone(),
            config.rate_limit_max,
            config.rate_limit_window_secs,
        );

        Self {
            store,
            calendar,
            stats,
            completion,
            badges,
            leafpass,
            challenges,
            feed,
            quests,
            rate_limiter,
            notifier,
            config: Arc::new(config),
        }
    }
}

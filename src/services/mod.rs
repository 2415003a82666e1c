//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어.
//! 모든 서비스는 상태가 없고 `Arc<dyn Store>` + `Calendar` 만 들고 있음.
//!
//! # Services
//! - `StatsCalculator`: 완료 로그 → 통계
//! - `CompletionEngine`: 일일 퀘스트 완료 (멱등)
//! - `BadgeUnlocker`: 규칙 기반 배지 지급
//! - `LeafPassService`: 포인트 → 레벨
//! - `ChallengeService`: 챌린지 참가, 리더보드
//! - `FeedService`: 활동 피드
//! - `QuestCatalog`: 퀘스트 목록/생성
//! - `RateLimiter`: 고정 윈도우 요청 제한
//! - `Notifier`: Telegram 메시지 전송

mod badges;
mod challenges;
mod completion;
mod feed;
mod leafpass;
pub mod notifier;
mod quests;
mod rate_limit;
mod stats;

pub use badges::{BadgeUnlocker, BadgeView, NextReward, OwnedBadgeView, DEFAULT_NEXT_REWARDS};
pub use challenges::{ChallengeService, ChallengeView, LeaderboardRow};
pub use completion::{CompletionEngine, CompletionOutcome};
pub use feed::FeedService;
pub use leafpass::{level_for, next_level, LeafPass, LeafPassService, LeafPassStatus, LevelTier, LEVEL_TIERS};
pub use notifier::{Notifier, NoopNotifier, TelegramNotifier};
pub use quests::{QuestCatalog, MAX_TASK_POINTS};
pub use rate_limit::RateLimiter;
pub use stats::{compute_stats, StatsCalculator};

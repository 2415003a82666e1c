//! GreenSphere API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Client (Telegram Mini-App / Bot)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /api/tasks  /api/complete  /api/challenges/*  /api/feed ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  CompletionEngine  StatsCalculator  BadgeUnlocker        ││
//! │  │  LeafPassService   ChallengeService RateLimiter          ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (sqlx)    In-memory (dev/test)               ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Telegram Bot API (sendMessage)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use greensphere_api::{
    clock::SystemClock,
    config::StoreBackend,
    db::seed,
    routes,
    services::{NoopNotifier, Notifier, TelegramNotifier},
    AppState, Config, Database, MemoryStore, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "greensphere_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting GreenSphere API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!(timezone = %config.timezone, environment = ?config.environment, "📋 Configuration loaded");

    // 저장소 연결
    let store: Arc<dyn Store> = match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(url)) => {
            let db = Database::connect(url).await?;
            tracing::info!("🗄️  Database connected");

            // 마이그레이션 실행
            db.run_migrations().await?;
            tracing::info!("📦 Migrations completed");
            Arc::new(db)
        }
        _ => {
            tracing::warn!("🧪 Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let clock = Arc::new(SystemClock);

    // 알림 채널
    let notifier: Arc<dyn Notifier> = match config.telegram_bot_token.as_deref() {
        Some(token) => {
            tracing::info!("🤖 Telegram notifier enabled");
            Arc::new(TelegramNotifier::new(token)?)
        }
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, notifications disabled");
            Arc::new(NoopNotifier)
        }
    };

    let port = config.port;
    let state = AppState::new(store, clock, notifier, config);

    if state.config.seed_demo_data {
        seed::seed_catalog(state.store.as_ref(), &state.calendar).await?;
        tracing::info!("🌱 Demo catalog ready");
    }

    // 라우터 구성
    let app = create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 라우터 + 미들웨어
fn create_router(state: AppState) -> Router {
    let cors = routes::cors_layer(&state.config);

    routes::router(state)
        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

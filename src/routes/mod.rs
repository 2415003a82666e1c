//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/tasks`, `/api/quests`, `/api/complete` - 퀘스트
//! - `/api/init_user`, `/api/me`, `/api/history` - 사용자
//! - `/api/badges` - 배지
//! - `/api/challenges/*` - 챌린지, 리더보드
//! - `/api/feed/*` - 활동 피드
//! - `/api/admin/*` - 관리자
//! - `/telegram/webhook` - 봇 웹훅

pub mod admin;
pub mod badges;
pub mod challenges;
pub mod feed;
pub mod health;
pub mod tasks;
pub mod users;
pub mod webhook;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    auth::{INIT_DATA_HEADER, TELEGRAM_ID_HEADER},
    config::Config,
    AppState,
};

/// 라우터 생성 (미들웨어 제외)
///
/// # Route Structure
///
/// ```text
/// GET  /health                         - 서버 상태 확인
///
/// GET  /api/tasks                      - 오늘의 퀘스트 + 통계 + 배지 + 레벨
/// GET  /api/quests                     - 노출 중인 퀘스트
/// POST /api/complete                   - 퀘스트 완료 (멱등)
///
/// POST /api/init_user                  - 사용자 등록
/// GET  /api/me                         - 내 정보
/// GET  /api/history                    - 완료 히스토리
/// GET  /api/badges                     - 획득/다음 배지
///
/// GET  /api/challenges                 - 챌린지 목록
/// POST /api/challenges/join            - 챌린지 참가
/// GET  /api/challenges/:id/leaderboard - 리더보드
///
/// GET  /api/feed                       - 활동 피드
/// POST /api/feed/:id/like              - 좋아요
/// POST /api/feed/:id/comment           - 댓글
///
/// GET  /api/admin/daily-stats          - 일일 집계
/// POST /api/admin/tasks                - 퀘스트 생성
/// POST /api/admin/challenges           - 챌린지 생성
///
/// POST /telegram/webhook               - Telegram 업데이트
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Quests
        .route("/api/tasks", get(tasks::get_tasks))
        .route("/api/quests", get(tasks::list_quests))
        .route("/api/complete", post(tasks::complete))

        // Users
        .route("/api/init_user", post(users::init_user))
        .route("/api/me", get(users::me))
        .route("/api/history", get(users::history))
        .route("/api/badges", get(badges::list_badges))

        // Challenges
        .route("/api/challenges", get(challenges::list_challenges))
        .route("/api/challenges/join", post(challenges::join_challenge))
        .route("/api/challenges/:id/leaderboard", get(challenges::leaderboard))

        // Feed
        .route("/api/feed", get(feed::list_feed))
        .route("/api/feed/:id/like", post(feed::like))
        .route("/api/feed/:id/comment", post(feed::comment))

        // Admin
        .route("/api/admin/daily-stats", get(admin::daily_stats))
        .route("/api/admin/tasks", post(admin::create_task))
        .route("/api/admin/challenges", post(admin::create_challenge))

        // Bot
        .route("/telegram/webhook", post(webhook::telegram_webhook))

        // 상태 주입
        .with_state(state)
}

/// CORS 설정
///
/// 허용 도메인은 ALLOWED_ORIGINS (기본: localhost 개발 서버).
/// 프로덕션에서는 메서드/헤더도 필요한 것만 허용
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if config.is_production() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static(INIT_DATA_HEADER),
                HeaderName::from_static(TELEGRAM_ID_HEADER),
                HeaderName::from_static(admin::ADMIN_KEY_HEADER),
            ])
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::testing::sign_init_data;
    use crate::clock::{Clock, FixedClock};
    use crate::config::Config;
    use crate::db::{MemoryStore, NewTask, Store};
    use crate::services::NoopNotifier;
    use crate::types::TaskId;

    const BOT_TOKEN: &str = "42:TEST";

    struct TestApp {
        app: Router,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
    }

    impl TestApp {
        fn new(env: &[(&str, &str)]) -> Self {
            let vars: std::collections::HashMap<String, String> =
                env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(FixedClock::at_noon(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
            let state = AppState::new(store.clone(), clock.clone(), Arc::new(NoopNotifier), config);

            Self {
                app: router(state),
                store,
                clock,
            }
        }

        async fn task(&self, title: &str, points: i64) -> TaskId {
            self.store
                .insert_task(&NewTask::new(title, points), self.clock.now())
                .await
                .unwrap()
                .id
        }

        async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }

        async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
            let mut builder = Request::builder().method("GET").uri(uri);
            for (k, v) in headers {
                builder = builder.header(*k, *v);
            }
            self.call(builder.body(Body::empty()).unwrap()).await
        }

        async fn post(&self, uri: &str, headers: &[(&str, &str)], body: Value) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json");
            for (k, v) in headers {
                builder = builder.header(*k, *v);
            }
            self.call(builder.body(Body::from(body.to_string())).unwrap()).await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let t = TestApp::new(&[]);
        let (status, body) = t.get("/health", &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"]["connected"], true);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent_over_http() {
        let t = TestApp::new(&[]);
        let walk = t.task("Walk 5000 steps", 10).await;
        let who = [("x-telegram-id", "1001")];

        let (status, first) = t.post("/api/complete", &who, json!({ "task_id": walk })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["ok"], true);
        assert_eq!(first["duplicate"], false);
        assert_eq!(first["leafpass"]["level"], "L1");

        let (_, second) = t.post("/api/complete", &who, json!({ "task_id": walk })).await;
        assert_eq!(second["duplicate"], true);
        assert!(second.get("leafpass").is_none());

        let (status, tasks) = t.get("/api/tasks?lang=zh", &who).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tasks["tasks"][0]["completed_today"], true);
        assert_eq!(tasks["stats"]["total_points"], 10);
        assert_eq!(tasks["stats"]["streak"], 1);
        assert_eq!(tasks["stats"]["today_completed"], 1);
        assert_eq!(tasks["leafpass"]["next"]["level"], "L2");
    }

    #[tokio::test]
    async fn test_complete_unknown_task() {
        let t = TestApp::new(&[]);
        let (status, body) = t
            .post("/api/complete", &[], json!({ "user_id": 5, "task_id": 404 }))
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_identity_required_when_direct_disabled() {
        let t = TestApp::new(&[("ENVIRONMENT", "production")]);
        let walk = t.task("Walk", 10).await;

        let (status, _) = t
            .post("/api/complete", &[("x-telegram-id", "7")], json!({ "user_id": 7, "task_id": walk }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verified_init_data() {
        let t = TestApp::new(&[("ENVIRONMENT", "production"), ("TELEGRAM_BOT_TOKEN", BOT_TOKEN)]);
        let walk = t.task("Walk", 10).await;
        let auth_date = t.clock.now().timestamp().to_string();
        let init_data = sign_init_data(
            BOT_TOKEN,
            &[("auth_date", &auth_date), ("user", r#"{"id":555,"first_name":"Lee"}"#)],
        );

        let (status, body) = t
            .post("/api/init_user", &[("x-telegram-init-data", init_data.as_str())], json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], 555);
        assert_eq!(t.store.get_user(555).await.unwrap().unwrap().name, "Lee");

        let (status, _) = t
            .post("/api/complete", &[("x-telegram-init-data", init_data.as_str())], json!({ "task_id": walk }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let forged = init_data.replace("555", "556");
        let (status, _) = t
            .post("/api/complete", &[("x-telegram-init-data", forged.as_str())], json!({ "task_id": walk }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_init_user_rate_limited() {
        let t = TestApp::new(&[("RATE_LIMIT_MAX", "5")]);
        let body = json!({ "telegram_id": 9, "username": "  " });

        for _ in 0..5 {
            let (status, _) = t.post("/api/init_user", &[], body.clone()).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = t.post("/api/init_user", &[], body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");

        // 빈 이름은 기본값 유지
        assert_eq!(t.store.get_user(9).await.unwrap().unwrap().name, "Telegram User");
    }

    #[tokio::test]
    async fn test_challenge_flow() {
        let t = TestApp::new(&[("ADMIN_API_KEY", "s3cret")]);
        let walk = t.task("Walk", 10).await;
        let admin = [("x-admin-key", "s3cret")];

        let (status, _) = t
            .post(
                "/api/admin/challenges",
                &admin,
                json!({ "code": "jan", "title": "January", "start_date": "2024-01-10",
                        "end_date": "2024-01-01", "task_ids": [walk] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, challenge) = t
            .post(
                "/api/admin/challenges",
                &admin,
                json!({ "code": "jan", "title": "January", "start_date": "2024-01-01",
                        "end_date": "2024-01-31", "task_ids": [walk] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let challenge_id = challenge["id"].as_i64().unwrap();

        let (status, _) = t
            .post("/api/challenges/join", &[], json!({ "user_id": 3, "challenge_id": challenge_id }))
            .await;
        assert_eq!(status, StatusCode::OK);
        t.post("/api/complete", &[], json!({ "user_id": 3, "task_id": walk })).await;

        let (_, board) = t
            .get(&format!("/api/challenges/{}/leaderboard", challenge_id), &[])
            .await;
        assert_eq!(board["rows"][0]["user_id"], 3);
        assert_eq!(board["rows"][0]["points"], 10);
        assert_eq!(board["rows"][0]["actions"], 1);

        let (_, list) = t.get("/api/challenges?user_id=3", &[]).await;
        assert_eq!(list["challenges"][0]["joined"], true);

        let (status, _) = t
            .post("/api/challenges/join", &[], json!({ "user_id": 3, "challenge_id": 999 }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, empty) = t.get("/api/challenges/999/leaderboard", &[]).await;
        assert_eq!(empty["rows"], json!([]));
    }

    #[tokio::test]
    async fn test_admin_requires_key() {
        let disabled = TestApp::new(&[]);
        let (status, _) = disabled
            .get("/api/admin/daily-stats", &[("x-admin-key", "anything")])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let t = TestApp::new(&[("ADMIN_API_KEY", "s3cret")]);
        let (status, _) = t.get("/api/admin/daily-stats", &[("x-admin-key", "wrong")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, task) = t
            .post(
                "/api/admin/tasks",
                &[("x-admin-key", "s3cret")],
                json!({ "title": "Plant a tree", "points": 50, "i18n": { "zh": "种一棵树" } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        t.post("/api/complete", &[], json!({ "user_id": 8, "task_id": task["id"] })).await;

        let (status, stats) = t
            .get("/api/admin/daily-stats?date=2024-01-01", &[("x-admin-key", "s3cret")])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["active_today"], 1);
        assert_eq!(stats["new_today"], 1);
        assert_eq!(stats["completions_today"], 1);

        let (status, body) = t
            .post(
                "/api/admin/tasks",
                &[("x-admin-key", "s3cret")],
                json!({ "title": "Jackpot", "points": i64::MAX }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_feed_like_and_comment() {
        let t = TestApp::new(&[]);
        let walk = t.task("Walk", 10).await;
        t.post("/api/complete", &[], json!({ "user_id": 1, "task_id": walk })).await;

        let (_, feed) = t.get("/api/feed", &[]).await;
        let event_id = feed["items"][0]["id"].as_i64().unwrap();
        assert_eq!(feed["items"][0]["meta"]["task_id"], walk);

        let uri = format!("/api/feed/{}/like", event_id);
        let (_, first) = t.post(&uri, &[("x-telegram-id", "2")], json!({})).await;
        let (_, second) = t.post(&uri, &[("x-telegram-id", "2")], json!({})).await;
        assert_eq!(first["liked"], true);
        assert_eq!(second["liked"], false);

        let uri = format!("/api/feed/{}/comment", event_id);
        let (status, _) = t.post(&uri, &[], json!({ "user_id": 2, "text": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = t.post(&uri, &[], json!({ "user_id": 2, "text": "great job" })).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = t
            .post("/api/feed/999/comment", &[], json!({ "user_id": 2, "text": "hello" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, feed) = t.get("/api/feed?limit=5", &[]).await;
        assert_eq!(feed["items"][0]["like_count"], 1);
        assert_eq!(feed["items"][0]["comment_count"], 1);
    }

    #[tokio::test]
    async fn test_webhook_always_ok() {
        let t = TestApp::new(&[]);

        let (status, body) = t.post("/telegram/webhook", &[], json!({ "update_id": 1 })).await;
        assert_eq!((status, body["ok"].clone()), (StatusCode::OK, json!(true)));

        let update = json!({
            "update_id": 2,
            "message": {
                "message_id": 10,
                "from": { "id": 321, "first_name": "Ann", "username": "ann_eco" },
                "chat": { "id": 321 },
                "text": "/start"
            }
        });
        let (status, _) = t.post("/telegram/webhook", &[], update).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(t.store.get_user(321).await.unwrap().unwrap().name, "ann_eco");
    }

    #[tokio::test]
    async fn test_me_and_history() {
        let t = TestApp::new(&[]);
        let walk = t.task("Walk", 10).await;
        let who = [("x-telegram-id", "77")];

        let (status, _) = t.get("/api/me", &who).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        t.post("/api/complete", &who, json!({ "task_id": walk })).await;

        let (status, me) = t.get("/api/me", &who).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["total_points"], 10);
        assert_eq!(me["leafpass"]["name"], "Seed");

        let (_, history) = t.get("/api/history?limit=500", &who).await;
        assert_eq!(history["items"][0]["date"], "2024-01-01");
        assert_eq!(history["items"][0]["title"], "Walk");

        let (_, badges) = t.get("/api/badges", &who).await;
        assert_eq!(badges["owned"], json!([]));
    }

    #[tokio::test]
    async fn test_production_preflight_allows_admin_header() {
        let vars: std::collections::HashMap<String, String> = [
            ("ENVIRONMENT", "production"),
            ("ALLOWED_ORIGINS", "https://admin.green.example"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let cors = cors_layer(&config);

        let clock = Arc::new(FixedClock::at_noon(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let state = AppState::new(Arc::new(MemoryStore::new()), clock, Arc::new(NoopNotifier), config);
        let app = router(state).layer(cors);

        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/api/admin/tasks")
            .header("origin", "https://admin.green.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type,x-admin-key")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(preflight).await.unwrap();

        let allow_origin = response.headers().get("access-control-allow-origin").unwrap();
        assert_eq!(allow_origin, "https://admin.green.example");
        let allow_headers = response
            .headers()
            .get("access-control-allow-headers")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(allow_headers.contains("x-admin-key"));
        assert!(allow_headers.contains("x-telegram-init-data"));
    }
}

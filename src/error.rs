//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Three layers, each a thiserror enum converted into the next with `From`:
//!
//! ```text
//! StoreError (db)  ──▶  ServiceError (services)  ──▶  ApiError (HTTP)
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

// ============ Store ============

/// 저장소 에러
///
/// 유니크 제약 위반은 에러가 아님 → `InsertOutcome::AlreadyExists` 로 반환됨
#[derive(Debug, Error)]
pub enum StoreError {
    /// 락 경합, 커넥션 풀 타임아웃 등 재시도 가능한 에러
    #[error("storage temporarily unavailable: {0}")]
    Transient(String),

    /// 멱등 처리 대상이 아닌 유니크 키 충돌 (예: 챌린지 코드 중복)
    #[error("conflict: {0}")]
    Conflict(String),

    /// 저장된 데이터를 도메인 타입으로 변환할 수 없음
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// PostgreSQL SQLSTATE 중 재시도 가능한 코드
/// - 40001: serialization_failure
/// - 40P01: deadlock_detected
/// - 55P03: lock_not_available
const TRANSIENT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => StoreError::Transient("connection pool timed out".to_string()),
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .map(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
                    .unwrap_or(false) =>
            {
                StoreError::Transient(db_err.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============ Service ============

/// 서비스 레이어 에러
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============ HTTP ============

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 클라이언트 에러: 4xx (잘못된 요청, 인증 실패 등)
/// - 서버 에러: 5xx (내부 오류)
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ============ 401 Unauthorized ============
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ 429 Too Many Requests ============
    #[error("Too many requests")]
    TooManyRequests,

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ============ 503 Service Unavailable ============
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), None),
            ApiError::ValidationError(msg) => (
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Unauthorized(reason) => (
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                Some(reason.clone()),
            ),
            ApiError::NotFound(resource) => {
                ("NOT_FOUND", format!("{} not found", resource), None)
            }
            ApiError::Conflict(msg) => ("CONFLICT", msg.clone(), None),
            ApiError::TooManyRequests => (
                "RATE_LIMITED",
                "Too many requests, slow down".to_string(),
                None,
            ),

            // 5xx 서버 에러
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(service) => (
                "SERVICE_UNAVAILABLE",
                format!("{} is currently unavailable", service),
                None,
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// 저장소 에러를 ApiError로 변환
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store error: {:?}", err);
        match err {
            StoreError::Transient(msg) => ApiError::ServiceUnavailable(format!("store ({})", msg)),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(resource) => ApiError::NotFound(resource.to_string()),
            ServiceError::Invalid(msg) => ApiError::ValidationError(msg),
            ServiceError::RateLimited(_) => ApiError::TooManyRequests,
            ServiceError::Store(store) => store.into(),
        }
    }
}

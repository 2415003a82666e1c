//! Telegram identity
//!
//! # Interview Q&A
//!
//! Q: Mini-App 요청의 사용자를 어떻게 신뢰하는가?
//! A: Telegram WebApp `initData` 서명 검증
//!
//!    ```text
//!    secret           = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//!    data_check_string = "auth_date=...\nquery_id=...\nuser={...}"   (hash 제외, key 정렬)
//!    expected         = hex(HMAC_SHA256(key = secret, msg = data_check_string))
//!    ```
//!
//!    - hash 비교는 `Mac::verify_slice` (상수 시간)
//!    - auth_date 가 너무 오래되면 재사용된 것으로 보고 거절
//!
//! Q: 헤더 없이 user_id 만 보내는 요청은?
//! A: `ALLOW_DIRECT_IDENTITY` 가 켜진 배포(개발)에서만 허용.
//!    운영에서는 검증된 initData 없으면 401

use std::collections::BTreeMap;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::error::ApiError;
use crate::types::UserId;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";
pub const TELEGRAM_ID_HEADER: &str = "x-telegram-id";

/// initData 검증 실패 사유
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("initData is malformed")]
    Malformed,

    #[error("initData missing hash")]
    MissingHash,

    #[error("initData signature invalid")]
    BadSignature,

    #[error("initData expired")]
    Expired,

    #[error("initData missing user.id")]
    MissingUser,
}

/// 검증된 Telegram 사용자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramIdentity {
    pub telegram_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl TelegramIdentity {
    /// 표시 이름: username → first_name
    pub fn display_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct InitDataUser {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

fn secret_key(bot_token: &str) -> Result<HmacSha256, AuthError> {
    let mut mac = HmacSha256::new_from_slice(b"WebAppData").map_err(|_| AuthError::Malformed)?;
    mac.update(bot_token.as_bytes());
    let secret = mac.finalize().into_bytes();
    HmacSha256::new_from_slice(&secret).map_err(|_| AuthError::Malformed)
}

/// initData 쿼리 문자열 검증
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<TelegramIdentity, AuthError> {
    let mut fields: BTreeMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();
    if fields.is_empty() {
        return Err(AuthError::Malformed);
    }

    let received = fields.remove("hash").ok_or(AuthError::MissingHash)?;
    let received = hex::decode(received).map_err(|_| AuthError::BadSignature)?;

    let data_check_string = fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = secret_key(bot_token)?;
    mac.update(data_check_string.as_bytes());
    mac.verify_slice(&received).map_err(|_| AuthError::BadSignature)?;

    let auth_date = fields
        .get("auth_date")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or(AuthError::Malformed)?;
    if now - auth_date > max_age {
        return Err(AuthError::Expired);
    }

    let user: InitDataUser = fields
        .get("user")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or(AuthError::MissingUser)?;

    Ok(TelegramIdentity {
        telegram_id: user.id,
        username: user.username,
        first_name: user.first_name,
    })
}

// ============ Extractor ============

/// 요청 헤더에서 얻은 신원
///
/// 본문/쿼리의 user_id 는 핸들러가 `resolve` 에 넘겨줌
#[derive(Debug, Clone)]
pub enum Identity {
    /// initData 서명 검증됨
    Verified(TelegramIdentity),
    /// X-Telegram-Id (direct 모드)
    Direct(UserId),
    /// 헤더 없음
    Anonymous { allow_direct: bool },
}

impl Identity {
    /// 헤더 → (direct 모드일 때) 본문/쿼리 순으로 사용자 결정
    pub fn resolve(&self, fallback: Option<UserId>) -> Result<UserId, ApiError> {
        self.optional(fallback).ok_or_else(|| {
            ApiError::Unauthorized("missing X-Telegram-Init-Data".to_string())
        })
    }

    /// 신원이 없어도 되는 엔드포인트용
    pub fn optional(&self, fallback: Option<UserId>) -> Option<UserId> {
        match self {
            Identity::Verified(identity) => Some(identity.telegram_id),
            Identity::Direct(id) => Some(*id),
            Identity::Anonymous { allow_direct: true } => fallback,
            Identity::Anonymous { allow_direct: false } => None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Identity::Verified(identity) => identity.display_name(),
            _ => None,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let config = &state.config;

        if let Some(init_data) = parts.headers.get(INIT_DATA_HEADER) {
            let init_data = init_data
                .to_str()
                .map_err(|_| ApiError::Unauthorized(AuthError::Malformed.to_string()))?;
            let bot_token = config.telegram_bot_token.as_deref().ok_or_else(|| {
                tracing::error!("X-Telegram-Init-Data received but TELEGRAM_BOT_TOKEN is not set");
                ApiError::Unauthorized("initData verification unavailable".to_string())
            })?;

            let identity = verify_init_data(
                init_data,
                bot_token,
                Duration::seconds(config.init_data_max_age_secs),
                state.calendar.now(),
            )
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected Telegram initData");
                ApiError::Unauthorized(e.to_string())
            })?;
            return Ok(Identity::Verified(identity));
        }

        if !config.allow_direct_identity {
            return Ok(Identity::Anonymous { allow_direct: false });
        }

        match parts.headers.get(TELEGRAM_ID_HEADER) {
            Some(raw) => raw
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<UserId>().ok())
                .map(Identity::Direct)
                .ok_or_else(|| ApiError::BadRequest("Invalid X-Telegram-Id header".to_string())),
            None => Ok(Identity::Anonymous { allow_direct: true }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 테스트용 서명된 initData 생성
    pub fn sign_init_data(bot_token: &str, fields: &[(&str, &str)]) -> String {
        let sorted: BTreeMap<&str, &str> = fields.iter().copied().collect();
        let data_check_string = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut mac = secret_key(bot_token).unwrap();
        mac.update(data_check_string.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in fields {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sign_init_data;
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";
    const USER: &str = r#"{"id":777,"first_name":"Mina","username":"mina_green"}"#;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn signed(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        sign_init_data(TOKEN, &[("query_id", "AAF"), ("user", USER), ("auth_date", &auth_date)])
    }

    #[test]
    fn test_valid_init_data() {
        let identity = verify_init_data(&signed(1_700_000_000 - 60), TOKEN, Duration::days(1), now()).unwrap();

        assert_eq!(identity.telegram_id, 777);
        assert_eq!(identity.display_name(), Some("mina_green"));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let err = verify_init_data(&signed(1_700_000_000), "999:OTHER", Duration::days(1), now());
        assert_eq!(err, Err(AuthError::BadSignature));
    }

    #[test]
    fn test_tampered_field_rejected() {
        let tampered = signed(1_700_000_000).replace("777", "778");
        let err = verify_init_data(&tampered, TOKEN, Duration::days(1), now());
        assert_eq!(err, Err(AuthError::BadSignature));
    }

    #[test]
    fn test_expired_init_data() {
        let err = verify_init_data(&signed(1_700_000_000 - 90_000), TOKEN, Duration::days(1), now());
        assert_eq!(err, Err(AuthError::Expired));
    }

    #[test]
    fn test_missing_hash() {
        let err = verify_init_data("auth_date=1&user=%7B%7D", TOKEN, Duration::days(1), now());
        assert_eq!(err, Err(AuthError::MissingHash));
    }

    #[test]
    fn test_identity_resolution_order() {
        let verified = Identity::Verified(TelegramIdentity {
            telegram_id: 1,
            username: None,
            first_name: Some("A".into()),
        });
        assert_eq!(verified.resolve(Some(2)).unwrap(), 1);
        assert_eq!(Identity::Direct(3).resolve(Some(2)).unwrap(), 3);
        assert_eq!(Identity::Anonymous { allow_direct: true }.resolve(Some(2)).unwrap(), 2);
        assert!(Identity::Anonymous { allow_direct: true }.resolve(None).is_err());
        assert!(Identity::Anonymous { allow_direct: false }.resolve(Some(2)).is_err());
    }
}

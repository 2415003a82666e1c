//! Outbound Telegram notifications
//!
//! 완료/배지 알림, /start 환영 메시지 전송.
//! 요청 경로는 전송 결과를 기다리지 않음 (`dispatch` 가 런타임에 spawn).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

/// 메시지 전송 인터페이스
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TelegramNotifier {
    const API_BASE: &'static str = "https://api.telegram.org";
    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(bot_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", Self::API_BASE, bot_token),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .context("sendMessage request failed")?;

        if !response.status().is_success() {
            bail!("sendMessage returned {}", response.status());
        }
        Ok(())
    }
}

/// 봇 토큰이 없을 때
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_message(&self, chat_id: i64, _text: &str) -> Result<()> {
        tracing::debug!(chat_id, "Notifier disabled, message dropped");
        Ok(())
    }
}

/// 백그라운드 전송. 실패는 warn 로그만 남김
pub fn dispatch(notifier: Arc<dyn Notifier>, chat_id: i64, text: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send_message(chat_id, &text).await {
            tracing::warn!(chat_id, error = %e, "Telegram notification failed");
        }
    });
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// 보낸 메시지를 기록
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().await.push((chat_id, text.to_string()));
            Ok(())
        }
    }

    /// 항상 실패
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<()> {
            bail!("telegram is down")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_endpoint_embeds_token() {
        let notifier = TelegramNotifier::new("123:abc").unwrap();
        assert_eq!(notifier.endpoint, "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        dispatch(Arc::new(FailingNotifier), 1, "hi".to_string());
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let notifier = Arc::new(RecordingNotifier::default());
        dispatch(notifier.clone(), 7, "hello".to_string());

        for _ in 0..10 {
            if !notifier.sent.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*notifier.sent.lock().await, vec![(7, "hello".to_string())]);
    }
}

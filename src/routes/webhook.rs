//! Telegram Bot Webhook
//!
//! 메시지를 보낸 사용자를 등록하고 `/start` 에 환영 메시지로 응답.
//! Telegram 은 200 이 아니면 같은 업데이트를 계속 재전송하므로 항상 `{ok: true}`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{services::notifier, types::UserId, AppState};

const WELCOME_TEXT: &str = "🌱 Welcome to GreenSphere!\n\
Open the app to check in today's green quests, earn points and unlock badges.";

// ============ Telegram Update ============

#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub from: Option<Sender>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .map(|cmd| cmd == "/start" || cmd.starts_with("/start@"))
        .unwrap_or(false)
}

/// POST /telegram/webhook
///
/// 본문이 Update 형식이 아니어도 200
pub async fn telegram_webhook(
    State(state): State<AppState>,
    body: Option<Json<Update>>,
) -> Json<WebhookResponse> {
    let Some(message) = body.and_then(|Json(update)| update.message) else {
        return Json(WebhookResponse { ok: true });
    };

    if let Some(sender) = &message.from {
        let name = sender
            .username
            .as_deref()
            .or(sender.first_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty());

        if let Err(e) = state.store.upsert_user(sender.id, name, state.calendar.now()).await {
            tracing::warn!(user_id = sender.id, error = %e, "Failed to bind Telegram user");
        }
    }

    if message.text.as_deref().map(is_start_command).unwrap_or(false) {
        notifier::dispatch(state.notifier.clone(), message.chat.id, WELCOME_TEXT.to_string());
    }

    Json(WebhookResponse { ok: true })
}

//! `POST /webhook`: follow, unfollow and text messages from the chat platform.

use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use eyre::Result;
use kye_core::normalize_address;
use kye_messaging::{MessageContent, UserProfile, WebhookBody, WebhookEvent, verify_signature};
use kye_notifier::i18n::{t, t_with};
use kye_notifier::templates::render;
use kye_storage::models::{Language, NewUser, NotificationType, User};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::response::{ApiError, ApiResponse, json_ok};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

const HELP_KEYWORDS: &[&str] = &["help", "/help", "?", "도움말", "도움", "ヘルプ", "使い方"];

/// What a text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Help,
    /// Normalized wallet address.
    LinkWallet(String),
    Unknown,
}

impl Intent {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        if HELP_KEYWORDS.iter().any(|k| text.eq_ignore_ascii_case(k)) {
            return Intent::Help;
        }
        if text.starts_with("0x") || text.starts_with("0X") {
            if let Ok(wallet) = normalize_address(text) {
                return Intent::LinkWallet(wallet);
            }
        }
        Intent::Unknown
    }
}

/// Verify the signature, then handle every event of the batch. A failing
/// event is logged and does not fail the request.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<usize>>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if !verify_signature(&state.channel_secret, &body, signature) {
        warn!("Rejected webhook with an invalid signature");
        return Err(ApiError::Unauthorized);
    }

    let payload: WebhookBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed webhook body: {e}")))?;

    let mut handled = 0;
    for event in &payload.events {
        match handle_event(&state, event).await {
            Ok(()) => handled += 1,
            Err(e) => error!(kind = %event.kind, user_id = ?event.user_id(), error = %e, "Webhook event failed"),
        }
    }
    Ok(json_ok(handled))
}

pub async fn handle_event(state: &AppState, event: &WebhookEvent) -> Result<()> {
    let Some(user_id) = event.user_id() else {
        debug!(kind = %event.kind, "Ignoring event without a user source");
        return Ok(());
    };

    match event.kind.as_str() {
        "follow" => on_follow(state, user_id).await,
        "unfollow" => on_unfollow(state, user_id).await,
        "message" => {
            let Some(reply_token) = event.reply_token.as_deref() else {
                return Ok(());
            };
            on_message(state, user_id, reply_token, event.text().unwrap_or_default()).await
        }
        other => {
            debug!(kind = other, "Ignoring webhook event");
            Ok(())
        }
    }
}

/// Create or refresh the user from the platform profile.
async fn register(state: &AppState, user_id: &str) -> Result<User> {
    let profile = match state.sender.get_profile(user_id).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Profile lookup failed");
            None
        }
    };
    Ok(state.store.upsert_user(&new_user(user_id, profile.as_ref())).await?)
}

fn new_user(user_id: &str, profile: Option<&UserProfile>) -> NewUser {
    NewUser {
        user_id: user_id.to_string(),
        display_name: profile
            .map(|p| p.display_name.clone())
            .filter(|n| !n.is_empty()),
        picture_url: profile.and_then(|p| p.picture_url.clone()),
        language: profile
            .and_then(|p| p.language.as_deref())
            .map(Language::from_tag)
            .unwrap_or_default(),
    }
}

async fn on_follow(state: &AppState, user_id: &str) -> Result<()> {
    let user = register(state, user_id).await?;
    info!(user_id = %user_id, "User followed");
    let payload = json!({ "displayName": user.display_name.unwrap_or_default() });
    state
        .engine
        .send_notification(user_id, NotificationType::Welcome, &payload)
        .await?;
    Ok(())
}

async fn on_unfollow(state: &AppState, user_id: &str) -> Result<()> {
    state.store.set_user_wallet(user_id, None).await?;
    info!(user_id = %user_id, "User unfollowed, wallet unlinked");
    Ok(())
}

async fn on_message(state: &AppState, user_id: &str, reply_token: &str, text: &str) -> Result<()> {
    let user = match state.store.get_user(user_id).await? {
        Some(user) => user,
        None => register(state, user_id).await?,
    };
    state.store.touch_user(user_id).await?;

    if let Err(e) = respond(state, &user, reply_token, text).await {
        warn!(user_id = %user_id, error = %e, "Reply failed, apologising");
        let apology = MessageContent::text(t(user.language, "error.generic"));
        if let Err(e) = state.sender.reply(reply_token, &apology).await {
            error!(user_id = %user_id, error = %e, "Apology reply failed");
        }
    }
    Ok(())
}

async fn respond(state: &AppState, user: &User, reply_token: &str, text: &str) -> Result<()> {
    let language = user.language;
    let content = match Intent::classify(text) {
        Intent::Help | Intent::Unknown => render(NotificationType::Help, &json!({}), language),
        Intent::LinkWallet(wallet) => match state.store.get_user_by_wallet(&wallet).await? {
            Some(owner) if owner.user_id != user.user_id => {
                MessageContent::text(t(language, "wallet.taken"))
            }
            _ => {
                state.store.set_user_wallet(&user.user_id, Some(&wallet)).await?;
                info!(user_id = %user.user_id, wallet = %wallet, "Wallet linked");
                MessageContent::text(t_with(language, "wallet.linked", &json!({ "wallet": wallet })))
            }
        },
    };
    state.sender.reply(reply_token, &content).await?;
    Ok(())
}

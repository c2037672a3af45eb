//! Messaging platform boundary: what the notification engine and the webhook
//! need from the LINE Messaging API, behind the [`MessageSender`] trait.

pub mod content;
pub mod error;
pub mod line;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod signature;
pub mod webhook;

pub use content::{FlexCard, MessageContent};
pub use error::MessagingError;
pub use line::{LineClient, LineConfig};
#[cfg(any(test, feature = "test-util"))]
pub use mock::RecordingSender;
pub use signature::{sign, verify_signature};
pub use webhook::{WebhookBody, WebhookEvent};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public profile of a chat user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub language: Option<String>,
}

/// Outbound operations against the messaging platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Push a plain text message to a user or group.
    async fn send_text(&self, to: &str, text: &str) -> Result<(), MessagingError>;

    /// Push a structured card to a user or group.
    async fn send_card(&self, to: &str, card: &FlexCard) -> Result<(), MessagingError>;

    /// Answer an inbound event through its one-shot reply token.
    async fn reply(&self, reply_token: &str, content: &MessageContent)
    -> Result<(), MessagingError>;

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessagingError>;

    /// Whether the user has blocked (unfollowed) the bot.
    async fn is_user_blocked(&self, user_id: &str) -> Result<bool, MessagingError>;

    /// Push any content, picking the card or text path.
    async fn send_content(&self, to: &str, content: &MessageContent) -> Result<(), MessagingError> {
        match content {
            MessageContent::Text { text } => self.send_text(to, text).await,
            MessageContent::Card(card) => self.send_card(to, card).await,
        }
    }
}

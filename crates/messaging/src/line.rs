use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use crate::{FlexCard, MessageContent, MessageSender, MessagingError, UserProfile};

/// Credentials and endpoint of the LINE Messaging API.
#[derive(Debug, Clone, Default)]
pub struct LineConfig {
    pub channel_access_token: String,
    pub api_base: String,
}

impl LineConfig {
    pub fn is_configured(&self) -> bool {
        !self.channel_access_token.is_empty()
    }
}

/// Thin client over the LINE Messaging API.
///
/// Every call is a single attempt; retrying is the caller's policy.
pub struct LineClient {
    config: LineConfig,
    client: Client,
}

impl std::fmt::Debug for LineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineClient")
            .field("configured", &self.config.is_configured())
            .field("api_base", &self.config.api_base)
            .finish()
    }
}

impl LineClient {
    pub fn new(config: LineConfig) -> Result<Self, MessagingError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), MessagingError> {
        if !self.is_configured() {
            return Err(MessagingError::NotConfigured);
        }

        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.channel_access_token)
            .json(body)
            .send()
            .await?;

        check_status(resp).await.map(|_| ())
    }

    async fn push(&self, to: &str, message: Value) -> Result<(), MessagingError> {
        debug!(to = %to, "Pushing message");
        self.post(
            "/v2/bot/message/push",
            &json!({ "to": to, "messages": [message] }),
        )
        .await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, MessagingError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MessagingError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl MessageSender for LineClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), MessagingError> {
        self.push(to, MessageContent::text(text).to_line_message())
            .await
    }

    async fn send_card(&self, to: &str, card: &FlexCard) -> Result<(), MessagingError> {
        self.push(to, card.to_line_message()).await
    }

    async fn reply(
        &self,
        reply_token: &str,
        content: &MessageContent,
    ) -> Result<(), MessagingError> {
        self.post(
            "/v2/bot/message/reply",
            &json!({
                "replyToken": reply_token,
                "messages": [content.to_line_message()],
            }),
        )
        .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessagingError> {
        if !self.is_configured() {
            return Err(MessagingError::NotConfigured);
        }

        let resp = self
            .client
            .get(self.url(&format!("/v2/bot/profile/{user_id}")))
            .bearer_auth(&self.config.channel_access_token)
            .send()
            .await?;

        let profile = check_status(resp).await?.json::<UserProfile>().await?;
        Ok(profile)
    }

    /// The profile endpoint answers 404 for users who blocked or never added the bot.
    async fn is_user_blocked(&self, user_id: &str) -> Result<bool, MessagingError> {
        match self.get_profile(user_id).await {
            Ok(_) => Ok(false),
            Err(e) if e.status_code() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_refuses_to_send() {
        let client = LineClient::new(LineConfig {
            channel_access_token: String::new(),
            api_base: "https://api.line.me".into(),
        })
        .unwrap();

        let err = client.send_text("U1", "hi").await.unwrap_err();
        assert!(matches!(err, MessagingError::NotConfigured));
        assert!(client.is_user_blocked("U1").await.is_err());
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = LineClient::new(LineConfig {
            channel_access_token: "t".into(),
            api_base: "https://api.line.me/".into(),
        })
        .unwrap();
        assert_eq!(
            client.url("/v2/bot/message/push"),
            "https://api.line.me/v2/bot/message/push"
        );
    }
}

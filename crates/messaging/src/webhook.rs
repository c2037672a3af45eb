//! Inbound webhook payloads of the LINE Messaging API.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<InboundMessage>,
    pub timestamp: Option<i64>,
}

impl WebhookEvent {
    pub fn user_id(&self) -> Option<&str> {
        self.source.as_ref()?.user_id.as_deref()
    }

    /// Text of a text message event.
    pub fn text(&self) -> Option<&str> {
        match &self.message {
            Some(InboundMessage { kind, text, .. }) if kind == "text" => text.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_follow_and_text_events() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "destination": "Ubot",
                "events": [
                    {"type": "follow", "replyToken": "r1", "timestamp": 1,
                     "source": {"type": "user", "userId": "U1"}},
                    {"type": "message", "replyToken": "r2",
                     "source": {"type": "user", "userId": "U1"},
                     "message": {"id": "m1", "type": "text", "text": "help"}},
                    {"type": "message", "replyToken": "r3",
                     "source": {"type": "group", "groupId": "G1"},
                     "message": {"id": "m2", "type": "sticker"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(body.events.len(), 3);
        assert_eq!(body.events[0].kind, "follow");
        assert_eq!(body.events[0].user_id(), Some("U1"));
        assert_eq!(body.events[1].text(), Some("help"));
        assert_eq!(body.events[2].user_id(), None);
        assert_eq!(body.events[2].text(), None);
    }

    #[test]
    fn missing_events_is_an_empty_batch() {
        let body: WebhookBody = serde_json::from_str(r#"{"destination": "Ubot"}"#).unwrap();
        assert!(body.events.is_empty());
    }
}

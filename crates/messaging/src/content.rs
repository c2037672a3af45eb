use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A LINE flex message: alt text for notifications/previews plus the bubble JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexCard {
    pub alt_text: String,
    pub contents: Value,
}

/// Content of one outbound message, persisted as-is in the notification queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Card(FlexCard),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, MessageContent::Card(_))
    }

    /// Message object in the wire format of the Messaging API.
    pub fn to_line_message(&self) -> Value {
        match self {
            MessageContent::Text { text } => json!({ "type": "text", "text": text }),
            MessageContent::Card(card) => card.to_line_message(),
        }
    }
}

impl FlexCard {
    pub fn to_line_message(&self) -> Value {
        json!({
            "type": "flex",
            "altText": self.alt_text,
            "contents": self.contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_serializes_with_kind_tag() {
        let content = MessageContent::text("hello");
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({ "kind": "text", "text": "hello" }));
        assert_eq!(
            content.to_line_message(),
            json!({ "type": "text", "text": "hello" })
        );
    }

    #[test]
    fn card_keeps_alt_text_on_the_wire() {
        let content = MessageContent::Card(FlexCard {
            alt_text: "Deposit due".into(),
            contents: json!({ "type": "bubble" }),
        });
        assert!(content.is_card());
        let wire = content.to_line_message();
        assert_eq!(wire["type"], "flex");
        assert_eq!(wire["altText"], "Deposit due");
        assert_eq!(wire["contents"]["type"], "bubble");

        let stored = serde_json::to_string(&content).unwrap();
        let restored: MessageContent = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, content);
    }
}

//! Rendering of notification payloads into message content.
//!
//! Payloads are JSON objects with camelCase fields. Amounts arrive as raw
//! token units and are shown with two decimals.

use kye_messaging::{FlexCard, MessageContent};
use kye_storage::models::{Language, NotificationType};
use serde_json::{Value, json};

use crate::i18n::{t, t_with};

/// Decimals of the settlement token (USDT).
const TOKEN_DECIMALS: u32 = 6;

const COLOR_PRIMARY: &str = "#1DB446";
const COLOR_WARNING: &str = "#FF8C00";
const COLOR_DANGER: &str = "#E53935";

/// Render a notification for `language`. Types without a card use the
/// localized `notification.<TYPE>` text.
pub fn render(kind: NotificationType, payload: &Value, language: Language) -> MessageContent {
    let params = display_params(payload);
    match kind {
        NotificationType::DepositReminder => deposit_reminder_card(&params, language),
        NotificationType::CircleStatus => circle_status_card(&params, language),
        NotificationType::PayoutReceived => simple_card(
            kind,
            &params,
            language,
            "payout.title",
            COLOR_PRIMARY,
        ),
        NotificationType::RiskAlert => {
            simple_card(kind, &params, language, "risk.title", COLOR_DANGER)
        }
        NotificationType::Celebration => celebration_card(&params, language),
        NotificationType::Welcome => welcome_card(&params, language),
        NotificationType::Help => help_card(language),
        NotificationType::DepositConfirmed
        | NotificationType::MemberJoined
        | NotificationType::PenaltyCharged => MessageContent::text(text_for(kind, &params, language)),
    }
}

/// Plain text rendering, also used as the card alt text.
pub fn text_for(kind: NotificationType, params: &Value, language: Language) -> String {
    t_with(language, &format!("notification.{}", kind.as_str()), params)
}

/// Format raw token units as a decimal amount with two places.
pub fn format_amount(raw: &str) -> String {
    let Ok(units) = raw.parse::<u128>() else {
        return raw.to_string();
    };
    let scale = 10u128.pow(TOKEN_DECIMALS);
    let cents = (units % scale) / 10u128.pow(TOKEN_DECIMALS - 2);
    format!("{}.{:02}", units / scale, cents)
}

/// Copy of the payload with amounts formatted and a default circle name.
fn display_params(payload: &Value) -> Value {
    let mut params = match payload {
        Value::Object(fields) => fields.clone(),
        _ => Default::default(),
    };
    for key in ["amount", "depositAmount"] {
        if let Some(Value::String(raw)) = params.get(key) {
            let formatted = format_amount(raw);
            params.insert(key.to_string(), Value::String(formatted));
        }
    }
    if !params.contains_key("circleName") {
        params.insert("circleName".into(), json!("Kye"));
    }
    Value::Object(params)
}

fn field(params: &Value, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn row(label: String, value: String) -> Value {
    json!({
        "type": "box",
        "layout": "horizontal",
        "contents": [
            { "type": "text", "text": label, "size": "sm", "color": "#888888", "flex": 2 },
            { "type": "text", "text": value, "size": "sm", "wrap": true, "flex": 4 },
        ],
    })
}

fn bubble(title: String, color: &str, body: Vec<Value>) -> Value {
    json!({
        "type": "bubble",
        "header": {
            "type": "box",
            "layout": "vertical",
            "backgroundColor": color,
            "contents": [
                { "type": "text", "text": title, "weight": "bold", "color": "#FFFFFF" },
            ],
        },
        "body": {
            "type": "box",
            "layout": "vertical",
            "spacing": "md",
            "contents": body,
        },
    })
}

fn paragraph(text: String) -> Value {
    json!({ "type": "text", "text": text, "wrap": true, "size": "sm" })
}

fn card(alt_text: String, contents: Value) -> MessageContent {
    MessageContent::Card(FlexCard { alt_text, contents })
}

fn urgency_color(urgency: &str) -> &'static str {
    match urgency {
        "critical" => COLOR_DANGER,
        "high" => COLOR_WARNING,
        _ => COLOR_PRIMARY,
    }
}

fn deposit_reminder_card(params: &Value, language: Language) -> MessageContent {
    let urgency = field(params, "urgency");
    let mut rows = vec![
        paragraph(text_for(NotificationType::DepositReminder, params, language)),
        row(t(language, "reminder.amount"), format!("{} USDT", field(params, "amount"))),
        row(t(language, "reminder.deadline"), field(params, "deadline")),
    ];
    if !urgency.is_empty() {
        rows.push(row(
            "⚡".into(),
            t(language, &format!("urgency.{urgency}")),
        ));
    }
    card(
        text_for(NotificationType::DepositReminder, params, language),
        bubble(
            format!("{} · {}", t(language, "reminder.title"), field(params, "circleName")),
            urgency_color(&urgency),
            rows,
        ),
    )
}

fn circle_status_card(params: &Value, language: Language) -> MessageContent {
    let mut params = params.clone();
    let status = field(&params, "status");
    if let Some(fields) = params.as_object_mut() {
        fields.insert("status".into(), json!(t(language, &format!("status.{status}"))));
    }
    let mut rows = vec![paragraph(text_for(
        NotificationType::CircleStatus,
        &params,
        language,
    ))];
    if params.get("memberCount").is_some() {
        rows.push(row(
            t(language, "status.members"),
            format!(
                "{}/{}",
                field(&params, "memberCount"),
                field(&params, "maxMembers")
            ),
        ));
    }
    card(
        text_for(NotificationType::CircleStatus, &params, language),
        bubble(t(language, "status.title"), COLOR_PRIMARY, rows),
    )
}

fn simple_card(
    kind: NotificationType,
    params: &Value,
    language: Language,
    title_key: &str,
    color: &str,
) -> MessageContent {
    let text = text_for(kind, params, language);
    card(
        text.clone(),
        bubble(t(language, title_key), color, vec![paragraph(text)]),
    )
}

fn celebration_card(params: &Value, language: Language) -> MessageContent {
    let text = text_for(NotificationType::Celebration, params, language);
    card(
        text.clone(),
        bubble(
            t(language, "celebration.title"),
            COLOR_PRIMARY,
            vec![paragraph(text), paragraph(t(language, "celebration.body"))],
        ),
    )
}

fn welcome_card(params: &Value, language: Language) -> MessageContent {
    let text = text_for(NotificationType::Welcome, params, language);
    card(
        text.clone(),
        bubble(
            t(language, "welcome.title"),
            COLOR_PRIMARY,
            vec![paragraph(text), paragraph(t(language, "welcome.body"))],
        ),
    )
}

fn help_card(language: Language) -> MessageContent {
    card(
        t(language, "notification.HELP"),
        bubble(
            t(language, "help.title"),
            COLOR_PRIMARY,
            vec![
                paragraph(t(language, "help.wallet")),
                paragraph(t(language, "help.notifications")),
            ],
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_use_six_token_decimals() {
        assert_eq!(format_amount("100000000"), "100.00");
        assert_eq!(format_amount("1234567"), "1.23");
        assert_eq!(format_amount("0"), "0.00");
        assert_eq!(format_amount("n/a"), "n/a");
    }

    #[test]
    fn card_types_render_cards_and_others_text() {
        let payload = json!({ "circleName": "Family", "amount": "5000000", "round": 1 });
        for kind in NotificationType::ALL {
            let content = render(*kind, &payload, Language::En);
            let expect_card = !matches!(
                kind,
                NotificationType::DepositConfirmed
                    | NotificationType::MemberJoined
                    | NotificationType::PenaltyCharged
            );
            assert_eq!(content.is_card(), expect_card, "{kind}");
        }
    }

    #[test]
    fn fallback_text_is_localized() {
        let payload = json!({ "circleName": "가족계", "amount": "5000000", "round": 3 });
        let content = render(NotificationType::DepositConfirmed, &payload, Language::Ko);
        assert_eq!(
            content,
            MessageContent::text("✅ 가족계 3회차 입금 5.00 USDT가 확인되었습니다.")
        );
    }

    #[test]
    fn reminder_card_is_colored_by_urgency() {
        let payload = json!({
            "circleName": "Family",
            "amount": "100000000",
            "hoursLeft": 1,
            "deadline": "2026-01-01T00:00:00Z",
            "urgency": "critical",
        });
        let MessageContent::Card(card) = render(NotificationType::DepositReminder, &payload, Language::En)
        else {
            panic!("expected a card");
        };
        assert_eq!(card.contents["header"]["backgroundColor"], COLOR_DANGER);
        assert_eq!(card.alt_text, "⏰ 1h left to deposit 100.00 USDT into Family.");
    }
}

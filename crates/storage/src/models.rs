use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kye_messaging::MessageContent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

/// Implements `as_str`, `Display` and `FromStr` over the serialized names of an enum.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), ": {}"), other)),
                }
            }
        }
    };
}

// ─── User ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ko,
    En,
    Ja,
}

string_enum!(Language { Ko => "ko", En => "en", Ja => "ja" });

impl Language {
    /// Map a platform language tag (`en-US`, `ja`, …) onto a supported language.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        primary.to_ascii_lowercase().parse().unwrap_or_default()
    }
}

/// Per-user notification toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub deposit_reminders: bool,
    pub payout_alerts: bool,
    pub circle_updates: bool,
    pub risk_alerts: bool,
    pub celebrations: bool,
    /// Hours before a deadline to be reminded at. Empty means the
    /// configured `REMINDER_OFFSETS_HOURS`.
    pub reminder_times: Vec<u32>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            deposit_reminders: true,
            payout_alerts: true,
            circle_updates: true,
            risk_alerts: true,
            celebrations: true,
            reminder_times: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub wallet_address: Option<String>,
    pub language: Language,
    pub notification_preferences: Json<NotificationPreferences>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Profile data captured on first contact.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub user_id: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub language: Language,
}

// ─── Circle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CircleStatus {
    Setup,
    Active,
    Completed,
    Cancelled,
    Disputed,
}

string_enum!(CircleStatus {
    Setup => "setup",
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
    Disputed => "disputed",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleMetadata {
    pub name: String,
    pub description: Option<String>,
    pub round_duration_days: u32,
    pub penalty_bps: u32,
    pub total_value_locked: String,
    pub yield_earned: String,
}

impl Default for CircleMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            round_duration_days: 30,
            penalty_bps: 0,
            total_value_locked: "0".into(),
            yield_earned: "0".into(),
        }
    }
}

/// Local mirror of an on-chain savings circle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Circle {
    pub circle_address: String,
    pub group_id: Option<String>,
    pub group_id_hash: String,
    pub creator_id: Option<String>,
    pub creator_address: String,
    pub status: CircleStatus,
    /// Always `count(circle_members)`; never written independently.
    pub member_count: i32,
    pub max_members: i32,
    /// Raw token units (USDT has 6 decimals).
    pub deposit_amount: String,
    pub current_round: i32,
    pub next_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: Json<CircleMetadata>,
}

/// Insert-ready circle; starts in `setup` with its creator as the only member.
#[derive(Debug, Clone)]
pub struct NewCircle {
    pub circle_address: String,
    pub group_id_hash: String,
    pub creator_id: Option<String>,
    pub creator_address: String,
    pub max_members: i32,
    pub deposit_amount: String,
    pub created_at: DateTime<Utc>,
    pub metadata: CircleMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CircleMember {
    pub circle_address: String,
    pub wallet_address: String,
    pub user_id_hash: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleStats {
    pub total_circles: i64,
    pub by_status: Vec<StatusCount>,
    pub total_members: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

// ─── Ledgers ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub circle_address: String,
    pub round_index: i32,
    /// Depositor, beneficiary or penalised member.
    pub member_address: String,
    pub amount: String,
    /// Penalty paid alongside a deposit; zero elsewhere.
    pub penalty: String,
    pub transaction_hash: String,
    pub block_number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ledger {
    Deposits,
    Payouts,
    Penalties,
}

impl Ledger {
    pub fn table(&self) -> &'static str {
        match self {
            Ledger::Deposits => "deposits",
            Ledger::Payouts => "payouts",
            Ledger::Penalties => "penalties",
        }
    }
}

// ─── Blockchain events ──────────────────────────────────────────────────────

/// Append-only audit record of a decoded contract log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockchainEvent {
    pub event_name: String,
    pub contract_address: String,
    pub block_number: i64,
    pub log_index: i32,
    pub transaction_hash: String,
    pub args: Json<Value>,
    pub timestamp: DateTime<Utc>,
    /// Set by the scanner that owns the handler run.
    pub dispatch_claimed_at: Option<DateTime<Utc>>,
    pub handled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewBlockchainEvent {
    pub event_name: String,
    pub contract_address: String,
    pub block_number: i64,
    pub log_index: i32,
    pub transaction_hash: String,
    pub args: Value,
    pub timestamp: DateTime<Utc>,
}

impl NewBlockchainEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            transaction_hash: self.transaction_hash.clone(),
            event_name: self.event_name.clone(),
            contract_address: self.contract_address.clone(),
        }
    }
}

/// Idempotency key of an event occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub transaction_hash: String,
    pub event_name: String,
    pub contract_address: String,
}

/// Outcome of recording an event. `Inserted` and `Unhandled` hand the
/// dispatch claim to the caller; only that caller may run handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRecordState {
    /// First time this key is seen.
    Inserted,
    /// Already stored, never handled, and its claim was free or stale.
    Unhandled,
    /// Another scanner holds a live claim and is running the handlers.
    InFlight,
    /// Already stored and handled.
    Handled,
}

impl EventRecordState {
    pub fn needs_dispatch(&self) -> bool {
        matches!(self, EventRecordState::Inserted | EventRecordState::Unhandled)
    }
}

// ─── Notifications ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    DepositReminder,
    DepositConfirmed,
    PayoutReceived,
    CircleStatus,
    MemberJoined,
    RiskAlert,
    PenaltyCharged,
    Celebration,
    Welcome,
    Help,
}

string_enum!(NotificationType {
    DepositReminder => "DEPOSIT_REMINDER",
    DepositConfirmed => "DEPOSIT_CONFIRMED",
    PayoutReceived => "PAYOUT_RECEIVED",
    CircleStatus => "CIRCLE_STATUS",
    MemberJoined => "MEMBER_JOINED",
    RiskAlert => "RISK_ALERT",
    PenaltyCharged => "PENALTY_CHARGED",
    Celebration => "CELEBRATION",
    Welcome => "WELCOME",
    Help => "HELP",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    /// Claimed by a delivery attempt that has not finished yet.
    Sending,
    Sent,
    Failed,
    Cancelled,
}

string_enum!(NotificationStatus {
    Pending => "pending",
    Sending => "sending",
    Sent => "sent",
    Failed => "failed",
    Cancelled => "cancelled",
});

/// A queued message to one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationEvent {
    pub id: i64,
    pub notification_type: NotificationType,
    pub user_id: String,
    pub circle_address: Option<String>,
    pub message_content: Json<MessageContent>,
    pub scheduled_time: DateTime<Utc>,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub metadata: Json<Value>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Insert-ready notification; always enters the queue as `pending` with no retries.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub user_id: String,
    pub circle_address: Option<String>,
    pub message_content: MessageContent,
    pub scheduled_time: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_cancelled: i64,
    pub total_pending: i64,
    /// Percentage of finished deliveries that succeeded.
    pub success_rate: f64,
    pub by_type: Vec<TypeCount>,
    pub last_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub notification_type: String,
    pub count: i64,
}

impl NotificationStats {
    /// Success rate in percent over sent + failed rows, 0 when nothing finished.
    pub fn rate(sent: i64, failed: i64) -> f64 {
        let finished = sent + failed;
        if finished == 0 {
            0.0
        } else {
            sent as f64 * 100.0 / finished as f64
        }
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How close a reminder is to its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn from_offset_hours(hours: u32) -> Self {
        match hours {
            0..=1 => Urgency::Critical,
            2..=6 => Urgency::High,
            7..=24 => Urgency::Medium,
            _ => Urgency::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

/// One reminder slot before a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSlot {
    pub offset_hours: u32,
    pub at: DateTime<Utc>,
    pub urgency: Urgency,
}

/// Reminder slots `deadline - offset` that are still strictly after `now`,
/// earliest first. Duplicate offsets collapse.
pub fn reminder_slots(
    deadline: DateTime<Utc>,
    offsets_hours: &[u32],
    now: DateTime<Utc>,
) -> Vec<ReminderSlot> {
    let mut offsets = offsets_hours.to_vec();
    offsets.sort_unstable_by(|a, b| b.cmp(a));
    offsets.dedup();

    offsets
        .into_iter()
        .map(|offset_hours| ReminderSlot {
            offset_hours,
            at: deadline - Duration::hours(offset_hours as i64),
            urgency: Urgency::from_offset_hours(offset_hours),
        })
        .filter(|slot| slot.at > now)
        .collect()
}

use kye_storage::models::{NotificationPreferences, NotificationType};

/// Whether a user with `prefs` wants notifications of `kind`.
///
/// `WELCOME` and `HELP` are answers to the user's own actions and always go out.
pub fn should_send(prefs: &NotificationPreferences, kind: NotificationType) -> bool {
    match kind {
        NotificationType::DepositReminder | NotificationType::DepositConfirmed => {
            prefs.deposit_reminders
        }
        NotificationType::PayoutReceived => prefs.payout_alerts,
        NotificationType::CircleStatus | NotificationType::MemberJoined => prefs.circle_updates,
        NotificationType::RiskAlert | NotificationType::PenaltyCharged => prefs.risk_alerts,
        NotificationType::Celebration => prefs.celebrations,
        NotificationType::Welcome | NotificationType::Help => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_flag_filters_its_types() {
        let prefs = NotificationPreferences {
            risk_alerts: false,
            ..Default::default()
        };
        assert!(!should_send(&prefs, NotificationType::RiskAlert));
        assert!(!should_send(&prefs, NotificationType::PenaltyCharged));
        assert!(should_send(&prefs, NotificationType::PayoutReceived));
    }

    #[test]
    fn welcome_and_help_bypass_preferences() {
        let prefs = NotificationPreferences {
            deposit_reminders: false,
            payout_alerts: false,
            circle_updates: false,
            risk_alerts: false,
            celebrations: false,
            reminder_times: vec![],
        };
        assert!(should_send(&prefs, NotificationType::Welcome));
        assert!(should_send(&prefs, NotificationType::Help));
        assert!(NotificationType::ALL
            .iter()
            .filter(|k| !matches!(k, NotificationType::Welcome | NotificationType::Help))
            .all(|k| !should_send(&prefs, *k)));
    }
}

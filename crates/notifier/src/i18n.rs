//! Localized message strings.
//!
//! Keys are dotted paths (`notification.DEPOSIT_CONFIRMED`, `help.title`).
//! Placeholders are written `{name}` and filled from a JSON object.

use kye_storage::models::Language;
use serde_json::Value;

fn ko(key: &str) -> Option<&'static str> {
    Some(match key {
        "notification.DEPOSIT_REMINDER" => "⏰ {circleName} 입금 마감까지 {hoursLeft}시간 남았습니다. 입금액: {amount} USDT",
        "notification.DEPOSIT_CONFIRMED" => "✅ {circleName} {round}회차 입금 {amount} USDT가 확인되었습니다.",
        "notification.PAYOUT_RECEIVED" => "🎉 {circleName} {round}회차 곗돈 {amount} USDT를 받았습니다!",
        "notification.CIRCLE_STATUS" => "📢 {circleName} 상태: {status}",
        "notification.MEMBER_JOINED" => "👋 {circleName}에 새 멤버가 참여했습니다. ({memberCount}/{maxMembers})",
        "notification.RISK_ALERT" => "⚠️ {circleName} {round}회차 연체 페널티 {amount} USDT가 부과되었습니다.",
        "notification.PENALTY_CHARGED" => "⚠️ {circleName} {round}회차 페널티 {amount} USDT가 부과되었습니다.",
        "notification.CELEBRATION" => "🎊 {circleName} 계가 무사히 완료되었습니다!",
        "notification.WELCOME" => "{displayName}님, 계모임 봇에 오신 것을 환영합니다!",
        "notification.HELP" => "도움말: 지갑 주소(0x...)를 보내면 지갑이 연결됩니다.",
        "reminder.title" => "입금 알림",
        "reminder.deadline" => "마감",
        "reminder.amount" => "입금액",
        "urgency.critical" => "긴급",
        "urgency.high" => "높음",
        "urgency.medium" => "보통",
        "urgency.low" => "낮음",
        "status.title" => "계 상태 변경",
        "status.setup" => "모집 중",
        "status.active" => "진행 중",
        "status.completed" => "완료",
        "status.cancelled" => "취소됨",
        "status.disputed" => "분쟁 중",
        "status.members" => "멤버",
        "payout.title" => "곗돈 수령",
        "risk.title" => "페널티 경고",
        "celebration.title" => "축하합니다!",
        "celebration.body" => "모든 회차가 끝났습니다. 함께해 주셔서 감사합니다.",
        "welcome.title" => "환영합니다",
        "welcome.body" => "지갑 주소를 보내 계모임 알림을 받아보세요.",
        "help.title" => "도움말",
        "help.wallet" => "지갑 연결: 0x로 시작하는 지갑 주소를 보내주세요.",
        "help.notifications" => "입금 마감, 곗돈 수령, 페널티 소식을 알려드립니다.",
        "wallet.linked" => "지갑 {wallet}이(가) 연결되었습니다.",
        "wallet.taken" => "이미 다른 사용자에게 연결된 지갑입니다.",
        "error.generic" => "죄송합니다. 요청을 처리하지 못했습니다. 잠시 후 다시 시도해 주세요.",
        _ => return None,
    })
}

fn en(key: &str) -> Option<&'static str> {
    Some(match key {
        "notification.DEPOSIT_REMINDER" => "⏰ {hoursLeft}h left to deposit {amount} USDT into {circleName}.",
        "notification.DEPOSIT_CONFIRMED" => "✅ Your round {round} deposit of {amount} USDT to {circleName} is confirmed.",
        "notification.PAYOUT_RECEIVED" => "🎉 You received the round {round} payout of {amount} USDT from {circleName}!",
        "notification.CIRCLE_STATUS" => "📢 {circleName} is now {status}.",
        "notification.MEMBER_JOINED" => "👋 A new member joined {circleName} ({memberCount}/{maxMembers}).",
        "notification.RISK_ALERT" => "⚠️ A late penalty of {amount} USDT was charged in {circleName} round {round}.",
        "notification.PENALTY_CHARGED" => "⚠️ A penalty of {amount} USDT was charged in {circleName} round {round}.",
        "notification.CELEBRATION" => "🎊 {circleName} has completed successfully!",
        "notification.WELCOME" => "Welcome, {displayName}!",
        "notification.HELP" => "Help: send your wallet address (0x...) to link it.",
        "reminder.title" => "Deposit reminder",
        "reminder.deadline" => "Deadline",
        "reminder.amount" => "Amount",
        "urgency.critical" => "Critical",
        "urgency.high" => "High",
        "urgency.medium" => "Medium",
        "urgency.low" => "Low",
        "status.title" => "Circle status",
        "status.setup" => "recruiting",
        "status.active" => "active",
        "status.completed" => "completed",
        "status.cancelled" => "cancelled",
        "status.disputed" => "disputed",
        "status.members" => "Members",
        "payout.title" => "Payout received",
        "risk.title" => "Penalty warning",
        "celebration.title" => "Congratulations!",
        "celebration.body" => "Every round is done. Thanks for saving together.",
        "welcome.title" => "Welcome",
        "welcome.body" => "Send your wallet address to start receiving circle updates.",
        "help.title" => "Help",
        "help.wallet" => "Link a wallet: send an address starting with 0x.",
        "help.notifications" => "You'll get deadline reminders, payouts and penalty alerts.",
        "wallet.linked" => "Wallet {wallet} is now linked.",
        "wallet.taken" => "That wallet is already linked to another user.",
        "error.generic" => "Sorry, something went wrong. Please try again later.",
        _ => return None,
    })
}

fn ja(key: &str) -> Option<&'static str> {
    Some(match key {
        "notification.DEPOSIT_REMINDER" => "⏰ {circleName}の入金期限まであと{hoursLeft}時間です。入金額: {amount} USDT",
        "notification.DEPOSIT_CONFIRMED" => "✅ {circleName}の第{round}回入金 {amount} USDT を確認しました。",
        "notification.PAYOUT_RECEIVED" => "🎉 {circleName}の第{round}回受取金 {amount} USDT を受け取りました！",
        "notification.CIRCLE_STATUS" => "📢 {circleName}のステータス: {status}",
        "notification.MEMBER_JOINED" => "👋 {circleName}に新しいメンバーが参加しました（{memberCount}/{maxMembers}）。",
        "notification.RISK_ALERT" => "⚠️ {circleName}の第{round}回で延滞ペナルティ {amount} USDT が課されました。",
        "notification.PENALTY_CHARGED" => "⚠️ {circleName}の第{round}回でペナルティ {amount} USDT が課されました。",
        "notification.CELEBRATION" => "🎊 {circleName}が無事に完了しました！",
        "notification.WELCOME" => "{displayName}さん、ようこそ！",
        "notification.HELP" => "ヘルプ: ウォレットアドレス(0x...)を送ると連携されます。",
        "reminder.title" => "入金リマインダー",
        "reminder.deadline" => "期限",
        "reminder.amount" => "入金額",
        "urgency.critical" => "緊急",
        "urgency.high" => "高",
        "urgency.medium" => "中",
        "urgency.low" => "低",
        "status.title" => "ステータス変更",
        "status.setup" => "募集中",
        "status.active" => "進行中",
        "status.completed" => "完了",
        "status.cancelled" => "キャンセル",
        "status.disputed" => "紛争中",
        "status.members" => "メンバー",
        "payout.title" => "受取金",
        "risk.title" => "ペナルティ警告",
        "celebration.title" => "おめでとうございます！",
        "celebration.body" => "すべての回が終了しました。ご参加ありがとうございました。",
        "welcome.title" => "ようこそ",
        "welcome.body" => "ウォレットアドレスを送って通知を受け取りましょう。",
        "help.title" => "ヘルプ",
        "help.wallet" => "ウォレット連携: 0xで始まるアドレスを送ってください。",
        "help.notifications" => "入金期限、受取金、ペナルティをお知らせします。",
        "wallet.linked" => "ウォレット {wallet} を連携しました。",
        "wallet.taken" => "このウォレットは別のユーザーに連携済みです。",
        "error.generic" => "申し訳ありません。処理できませんでした。しばらくしてから再度お試しください。",
        _ => return None,
    })
}

fn lookup(language: Language, key: &str) -> Option<&'static str> {
    match language {
        Language::Ko => ko(key),
        Language::En => en(key),
        Language::Ja => ja(key),
    }
}

/// Translate `key`, falling back to Korean and then to the key itself.
pub fn t(language: Language, key: &str) -> String {
    lookup(language, key)
        .or_else(|| ko(key))
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string())
}

/// Translate `key` and fill `{placeholders}` from the fields of `params`.
/// Missing fields stay as written.
pub fn t_with(language: Language, key: &str, params: &Value) -> String {
    let mut text = t(language, key);
    if let Some(fields) = params.as_object() {
        for (name, value) in fields {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            text = text.replace(&format!("{{{name}}}"), &rendered);
        }
    }
    text
}

//! A [`MessageSender`] that records traffic instead of calling the platform.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{FlexCard, MessageContent, MessageSender, MessagingError, UserProfile};

#[derive(Default)]
struct State {
    sent: Vec<(String, MessageContent)>,
    replies: Vec<(String, MessageContent)>,
    blocked: HashSet<String>,
    profiles: HashMap<String, UserProfile>,
    failures_left: usize,
    fail_replies: bool,
}

#[derive(Default)]
pub struct RecordingSender {
    state: Mutex<State>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn block(&self, user_id: &str) {
        self.state().blocked.insert(user_id.to_string());
    }

    /// Make the next `n` pushes fail with a 500.
    pub fn fail_next(&self, n: usize) {
        self.state().failures_left = n;
    }

    pub fn fail_replies(&self) {
        self.state().fail_replies = true;
    }

    pub fn add_profile(&self, profile: UserProfile) {
        self.state().profiles.insert(profile.user_id.clone(), profile);
    }

    pub fn sent(&self) -> Vec<(String, MessageContent)> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, user_id: &str) -> Vec<MessageContent> {
        self.state()
            .sent
            .iter()
            .filter(|(to, _)| to == user_id)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn replies(&self) -> Vec<(String, MessageContent)> {
        self.state().replies.clone()
    }

    fn push(&self, to: &str, content: MessageContent) -> Result<(), MessagingError> {
        let mut state = self.state();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(MessagingError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        state.sent.push((to.to_string(), content));
        Ok(())
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), MessagingError> {
        self.push(to, MessageContent::text(text))
    }

    async fn send_card(&self, to: &str, card: &FlexCard) -> Result<(), MessagingError> {
        self.push(to, MessageContent::Card(card.clone()))
    }

    async fn reply(
        &self,
        reply_token: &str,
        content: &MessageContent,
    ) -> Result<(), MessagingError> {
        let mut state = self.state();
        if state.fail_replies {
            // Only the first reply fails; the apology must get through.
            state.fail_replies = false;
            return Err(MessagingError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        state.replies.push((reply_token.to_string(), content.clone()));
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessagingError> {
        let state = self.state();
        if state.blocked.contains(user_id) {
            return Err(MessagingError::Status {
                status: 404,
                body: "Not found".into(),
            });
        }
        Ok(state.profiles.get(user_id).cloned().unwrap_or_else(|| UserProfile {
            user_id: user_id.to_string(),
            ..Default::default()
        }))
    }

    async fn is_user_blocked(&self, user_id: &str) -> Result<bool, MessagingError> {
        Ok(self.state().blocked.contains(user_id))
    }
}

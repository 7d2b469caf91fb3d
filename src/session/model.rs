use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse conversational flow a user is in
///
/// Sub-steps within a flow (which onboarding question, which profile field)
/// live in the session's scratch data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Conversation,
    Onboarding,
    Matching,
    Profile,
}

/// Per-user ephemeral state
///
/// The serialized form is the snapshot record
/// `{userId, chatId, state, data, lastUpdated, expiresAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub chat_id: i64,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(user_id: &str, chat_id: i64, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            user_id: user_id.to_string(),
            chat_id,
            state: SessionState::default(),
            data: HashMap::new(),
            last_updated: now,
            expires_at: now + ttl,
        }
    }

    /// Expired once `now` is strictly past `expires_at`
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Slide the expiry window forward
    #[inline]
    pub(crate) fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.last_updated = now;
        self.expires_at = now + ttl;
    }
}

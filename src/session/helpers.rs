//! Typed accessors for the scratch keys the chat flows rely on.

use serde_json::Value;

use crate::session::store::SessionStore;

pub const ACTIVE_CONVERSATION_KEY: &str = "active_conversation";
pub const ONBOARDING_STEP_KEY: &str = "onboarding_step";
pub const PROFILE_EDIT_FIELD_KEY: &str = "profile_edit_field";
pub const CURRENT_MATCH_INDEX_KEY: &str = "current_match_index";
pub const CACHED_MATCHES_KEY: &str = "cached_matches";

impl SessionStore {
    fn get_string(&self, user_id: &str, key: &str) -> Option<String> {
        match self.get_data(user_id, key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    // Conversation

    pub fn set_active_conversation(&self, user_id: &str, conversation_id: &str) -> bool {
        self.set_data(user_id, ACTIVE_CONVERSATION_KEY, Value::from(conversation_id))
    }

    pub fn active_conversation(&self, user_id: &str) -> Option<String> {
        self.get_string(user_id, ACTIVE_CONVERSATION_KEY)
    }

    pub fn clear_active_conversation(&self, user_id: &str) -> bool {
        self.clear_data(user_id, ACTIVE_CONVERSATION_KEY)
    }

    // Onboarding

    pub fn set_onboarding_step(&self, user_id: &str, step: &str) -> bool {
        self.set_data(user_id, ONBOARDING_STEP_KEY, Value::from(step))
    }

    pub fn onboarding_step(&self, user_id: &str) -> Option<String> {
        self.get_string(user_id, ONBOARDING_STEP_KEY)
    }

    // Profile editing

    pub fn set_profile_edit_field(&self, user_id: &str, field: &str) -> bool {
        self.set_data(user_id, PROFILE_EDIT_FIELD_KEY, Value::from(field))
    }

    pub fn profile_edit_field(&self, user_id: &str) -> Option<String> {
        self.get_string(user_id, PROFILE_EDIT_FIELD_KEY)
    }

    pub fn clear_profile_edit_field(&self, user_id: &str) -> bool {
        self.clear_data(user_id, PROFILE_EDIT_FIELD_KEY)
    }

    // Browsing

    /// Position in the cached candidate list, 0 when unset
    pub fn current_match_index(&self, user_id: &str) -> usize {
        self.get_data(user_id, CURRENT_MATCH_INDEX_KEY)
            .as_ref()
            .and_then(index_from_value)
            .unwrap_or(0)
    }

    pub fn set_current_match_index(&self, user_id: &str, index: usize) -> bool {
        self.set_data(user_id, CURRENT_MATCH_INDEX_KEY, Value::from(index))
    }

    /// Remember a ranked candidate list and rewind the cursor
    pub fn set_cached_matches(&self, user_id: &str, candidate_ids: &[String]) -> bool {
        self.mutate_live(user_id, |session| {
            session
                .data
                .insert(CACHED_MATCHES_KEY.to_string(), Value::from(candidate_ids.to_vec()));
            session
                .data
                .insert(CURRENT_MATCH_INDEX_KEY.to_string(), Value::from(0usize));
        })
        .is_some()
    }

    pub fn cached_matches(&self, user_id: &str) -> Vec<String> {
        match self.get_data(user_id, CACHED_MATCHES_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Candidate under the cursor, advancing the cursor past it
    ///
    /// Read and advance happen under one lock, so concurrent callers for the
    /// same user never receive the same candidate.
    pub fn next_cached_match(&self, user_id: &str) -> Option<String> {
        self.mutate_live(user_id, |session| {
            let index = session
                .data
                .get(CURRENT_MATCH_INDEX_KEY)
                .and_then(index_from_value)
                .unwrap_or(0);
            let next = match session.data.get(CACHED_MATCHES_KEY) {
                Some(Value::Array(items)) => items.get(index).and_then(|v| v.as_str()).map(str::to_string),
                _ => None,
            }?;
            session
                .data
                .insert(CURRENT_MATCH_INDEX_KEY.to_string(), Value::from(index + 1));
            Some(next)
        })
        .flatten()
    }
}

fn index_from_value(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|i| usize::try_from(i).ok())
}

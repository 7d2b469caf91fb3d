use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use validator::Validate;

use crate::core::filters::matches_candidate_filter;
use crate::models::{CandidateFilter, Conversation, Interaction, Match, MatchStatus, Profile};
use crate::services::repository::{
    MatchRepository, MatchTransaction, ProfileRepository, RepositoryError, RepositoryResult,
};

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FetchProfile,
    FetchInteractions,
    FetchCandidates,
    Begin,
    UpdateMatch,
    InsertConversation,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    profiles: BTreeMap<String, Profile>,
    interactions: Vec<Interaction>,
    matches: Vec<Match>,
    conversations: Vec<Conversation>,
}

#[derive(Debug, Default)]
struct FailPoints(StdMutex<HashSet<FailPoint>>);

impl FailPoints {
    fn check(&self, point: FailPoint) -> RepositoryResult<()> {
        let armed = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if armed.contains(&point) {
            return Err(RepositoryError::Unavailable(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

/// In-process repository
///
/// Transactions take an exclusive hold on the whole dataset and work on a
/// private copy that replaces the shared state only on commit, so a dropped
/// transaction leaves no trace. Used by tests, benchmarks, and embedders that
/// keep their data in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<FailPoints>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile
    pub async fn upsert_profile(&self, profile: Profile) {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.user_id.clone(), profile);
    }

    /// Record a like/dislike/report
    pub async fn record_interaction(&self, interaction: Interaction) -> RepositoryResult<()> {
        interaction.validate()?;
        let mut state = self.state.lock().await;
        tracing::debug!(
            "Recorded interaction: {} -> {} ({:?})",
            interaction.actor_user_id,
            interaction.target_user_id,
            interaction.interaction_type
        );
        state.interactions.push(interaction);
        Ok(())
    }

    /// Snapshot of the directed match record, if any
    pub async fn get_match(&self, user_id: &str, target_id: &str) -> Option<Match> {
        let state = self.state.lock().await;
        state
            .matches
            .iter()
            .find(|m| m.user_id == user_id && m.target_id == target_id)
            .cloned()
    }

    /// Snapshot of every conversation
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    /// Make every subsequent call to `point` fail until cleared
    pub fn fail_on(&self, point: FailPoint) {
        let mut armed = self.fail_points.0.lock().unwrap_or_else(PoisonError::into_inner);
        armed.insert(point);
    }

    pub fn clear_failures(&self) {
        let mut armed = self.fail_points.0.lock().unwrap_or_else(PoisonError::into_inner);
        armed.clear();
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn fetch_profile(&self, user_id: &str) -> RepositoryResult<Option<Profile>> {
        self.fail_points.check(FailPoint::FetchProfile)?;
        let state = self.state.lock().await;
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn fetch_active_interactions(&self, actor_id: &str) -> RepositoryResult<Vec<Interaction>> {
        self.fail_points.check(FailPoint::FetchInteractions)?;
        let state = self.state.lock().await;
        Ok(state
            .interactions
            .iter()
            .filter(|i| i.actor_user_id == actor_id)
            .cloned()
            .collect())
    }

    async fn fetch_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Profile>> {
        self.fail_points.check(FailPoint::FetchCandidates)?;
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .values()
            .filter(|profile| matches_candidate_filter(profile, filter))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MatchRepository for InMemoryRepository {
    async fn begin(&self) -> RepositoryResult<Box<dyn MatchTransaction>> {
        self.fail_points.check(FailPoint::Begin)?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_points: Arc::clone(&self.fail_points),
        }))
    }

    async fn list_matches(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        limit: u32,
        offset: u32,
    ) -> RepositoryResult<Vec<Match>> {
        let state = self.state.lock().await;
        let mut matches: Vec<Match> = state
            .matches
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_conversation(&self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.conversations.iter().find(|c| c.links(a, b)).cloned())
    }

    async fn mutual_partner_ids(&self, user_id: &str) -> RepositoryResult<Vec<String>> {
        let state = self.state.lock().await;
        let partners: BTreeSet<String> = state
            .matches
            .iter()
            .filter(|m| m.status == MatchStatus::Mutual)
            .filter_map(|m| {
                if m.user_id == user_id {
                    Some(m.target_id.clone())
                } else if m.target_id == user_id {
                    Some(m.user_id.clone())
                } else {
                    None
                }
            })
            .collect();
        Ok(partners.into_iter().collect())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_points: Arc<FailPoints>,
}

#[async_trait]
impl MatchTransaction for MemoryTransaction {
    async fn lock_pair(&mut self, _a: &str, _b: &str) -> RepositoryResult<()> {
        // The owned guard already serializes every transaction.
        Ok(())
    }

    async fn find_match(&mut self, user_id: &str, target_id: &str) -> RepositoryResult<Option<Match>> {
        Ok(self
            .working
            .matches
            .iter()
            .find(|m| m.user_id == user_id && m.target_id == target_id)
            .cloned())
    }

    async fn insert_match(&mut self, record: &Match) -> RepositoryResult<()> {
        self.working.matches.push(record.clone());
        Ok(())
    }

    async fn update_match_status(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<Match> {
        self.fail_points.check(FailPoint::UpdateMatch)?;
        let record = self
            .working
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("match {}", id)))?;

        record.status = status;
        record.updated_at = updated_at.max(record.created_at);
        Ok(record.clone())
    }

    async fn find_conversation(&mut self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>> {
        Ok(self.working.conversations.iter().find(|c| c.links(a, b)).cloned())
    }

    async fn insert_conversation(&mut self, conversation: &Conversation) -> RepositoryResult<()> {
        self.fail_points.check(FailPoint::InsertConversation)?;
        self.working.conversations.push(conversation.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.fail_points.check(FailPoint::Commit)?;
        let MemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionType;

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let repo = InMemoryRepository::new();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_match(&Match::new("a", "b", MatchStatus::Pending)).await.unwrap();
        drop(tx);

        assert!(repo.get_match("a", "b").await.is_none());
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let repo = InMemoryRepository::new();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_match(&Match::new("a", "b", MatchStatus::Pending)).await.unwrap();
        tx.insert_conversation(&Conversation::new("a", "b")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.get_match("a", "b").await.unwrap().status, MatchStatus::Pending);
        assert!(repo.find_conversation("b", "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_discards_writes() {
        let repo = InMemoryRepository::new();
        repo.fail_on(FailPoint::Commit);

        let mut tx = repo.begin().await.unwrap();
        tx.insert_match(&Match::new("a", "b", MatchStatus::Pending)).await.unwrap();
        assert!(tx.commit().await.is_err());

        repo.clear_failures();
        assert!(repo.get_match("a", "b").await.is_none());
    }

    #[tokio::test]
    async fn test_record_interaction_rejects_self_target() {
        let repo = InMemoryRepository::new();
        let result = repo
            .record_interaction(Interaction::new("a", "a", InteractionType::Like))
            .await;
        assert!(matches!(result, Err(RepositoryError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_list_matches_pages_newest_first() {
        let repo = InMemoryRepository::new();
        let mut tx = repo.begin().await.unwrap();
        for (i, target) in ["b", "c", "d"].iter().enumerate() {
            let mut record = Match::new("a", target, MatchStatus::Pending);
            record.created_at += chrono::Duration::seconds(i as i64);
            record.updated_at = record.created_at;
            tx.insert_match(&record).await.unwrap();
        }
        tx.commit().await.unwrap();

        let page = repo.list_matches("a", None, 2, 0).await.unwrap();
        let targets: Vec<&str> = page.iter().map(|m| m.target_id.as_str()).collect();
        assert_eq!(targets, vec!["d", "c"]);

        let page = repo.list_matches("a", None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].target_id, "b");
    }
}

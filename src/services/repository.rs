use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CandidateFilter, Conversation, Interaction, Match, MatchStatus, Profile};

/// Errors raised by a data-layer adapter
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] validator::ValidationErrors),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Read side consumed by the ranking path
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Profile of a single user, `None` if the user does not exist
    async fn fetch_profile(&self, user_id: &str) -> RepositoryResult<Option<Profile>>;

    /// Every interaction recorded by `actor_id`
    async fn fetch_active_interactions(&self, actor_id: &str) -> RepositoryResult<Vec<Interaction>>;

    /// Active, complete, gender-compatible candidates outside the exclusion set
    ///
    /// The engine re-checks every criterion, so adapters may return a superset.
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Profile>>;
}

/// Match storage consumed by the status state machine
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Open a transaction
    ///
    /// Nothing written through the returned handle is visible to other callers
    /// until [`MatchTransaction::commit`]; dropping the handle rolls back.
    /// Callers must not use the repository's non-transactional methods while
    /// holding a transaction.
    async fn begin(&self) -> RepositoryResult<Box<dyn MatchTransaction>>;

    /// Outgoing match records of a user, newest first
    async fn list_matches(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        limit: u32,
        offset: u32,
    ) -> RepositoryResult<Vec<Match>>;

    /// Conversation between two users, in either order
    async fn find_conversation(&self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>>;

    /// Users sharing a `mutual` match with `user_id`, sorted by id
    async fn mutual_partner_ids(&self, user_id: &str) -> RepositoryResult<Vec<String>>;
}

/// Unit of work over match and conversation rows
#[async_trait]
pub trait MatchTransaction: Send {
    /// Serialize concurrent transactions touching the same unordered pair
    async fn lock_pair(&mut self, a: &str, b: &str) -> RepositoryResult<()>;

    async fn find_match(&mut self, user_id: &str, target_id: &str) -> RepositoryResult<Option<Match>>;

    async fn insert_match(&mut self, record: &Match) -> RepositoryResult<()>;

    /// Set a new status and return the updated record
    async fn update_match_status(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<Match>;

    async fn find_conversation(&mut self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>>;

    async fn insert_conversation(&mut self, conversation: &Conversation) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}

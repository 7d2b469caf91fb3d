use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use crate::core::{
    filters::{build_exclusion_set, is_ready_to_match, matches_candidate_filter},
    scoring::calculate_match_score,
};
use crate::models::{
    AdvanceMatchRequest, CandidateFilter, Conversation, Match, MatchPage, MatchStatus, Profile,
    ScoredCandidate, ScoringConfig,
};
use crate::services::repository::{
    MatchRepository, MatchTransaction, ProfileRepository, RepositoryError, RepositoryResult,
};

/// Errors returned by the matching engine
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid match transition: {from} -> {to}")]
    InvalidTransition { from: MatchStatus, to: MatchStatus },

    #[error("A match cannot be created in status {0}")]
    InvalidInitialStatus(MatchStatus),

    #[error("Status {0} is only reached through reciprocal acceptance")]
    ReservedStatus(MatchStatus),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] validator::ValidationErrors),

    #[error("Mutual match aborted: {0}")]
    MutualMatchAborted(#[source] RepositoryError),
}

/// Candidate matching engine
///
/// # Ranking pipeline
/// 1. Seeker readiness (active, complete profile)
/// 2. Like/dislike exclusion set
/// 3. Candidate query and filtering (self, exclusions, status, gender mutuality)
/// 4. Scoring, ordering, and truncation
///
/// The engine holds no locks of its own; one instance is shared by every
/// request worker.
#[derive(Debug)]
pub struct Matcher<R> {
    repository: Arc<R>,
    config: ScoringConfig,
}

impl<R> Clone for Matcher<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            config: self.config,
        }
    }
}

impl<R> Matcher<R>
where
    R: ProfileRepository + MatchRepository,
{
    pub fn new(repository: Arc<R>, config: ScoringConfig) -> Self {
        Self { repository, config }
    }

    pub fn with_default_config(repository: Arc<R>) -> Self {
        Self::new(repository, ScoringConfig::default())
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Rank the best candidates for a seeker, best (lowest score) first
    ///
    /// A missing, inactive, or incomplete seeker yields an empty list rather
    /// than an error. Repository failures propagate unchanged. Performs no
    /// writes.
    pub async fn rank_candidates(&self, seeker_id: &str) -> Result<Vec<ScoredCandidate>, MatchError> {
        let seeker = match self.repository.fetch_profile(seeker_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::debug!("Seeker {} not found, no candidates", seeker_id);
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!("Failed to fetch profile for {}: {}", seeker_id, e);
                return Err(e.into());
            }
        };

        if !is_ready_to_match(&seeker) {
            tracing::debug!("Seeker {} is not ready to match", seeker_id);
            return Ok(Vec::new());
        }

        // Guaranteed by the completeness check above
        let (Some(seeker_gender), Some(seeker_preference)) = (seeker.gender, seeker.preference_gender) else {
            return Ok(Vec::new());
        };

        let interactions = self
            .repository
            .fetch_active_interactions(seeker_id)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch interactions for {}: {}", seeker_id, e);
                e
            })?;

        let filter = CandidateFilter {
            seeker_id: seeker.user_id.clone(),
            seeker_gender,
            seeker_preference,
            exclude_user_ids: build_exclusion_set(&interactions),
        };

        let candidates = self.repository.fetch_candidates(&filter).await.map_err(|e| {
            tracing::warn!("Failed to fetch candidates for {}: {}", seeker_id, e);
            e
        })?;

        let total_candidates = candidates.len();
        let ranked = rank_profiles(&seeker, &filter, candidates, &self.config);

        tracing::debug!(
            "Ranked {} of {} candidates for {} ({} excluded)",
            ranked.len(),
            total_candidates,
            seeker_id,
            filter.exclude_user_ids.len()
        );

        Ok(ranked)
    }

    /// Create or advance the match record `user_id -> target_id`
    ///
    /// A new record starts in the requested status, which must be `pending`
    /// or one of its successors. An existing record must follow a legal edge.
    /// Landing on `accepted` while the reciprocal record is also `accepted`
    /// turns both into `mutual` and opens the pair's conversation. The whole
    /// call is one transaction.
    pub async fn advance_match(
        &self,
        user_id: &str,
        target_id: &str,
        status: MatchStatus,
    ) -> Result<Match, MatchError> {
        AdvanceMatchRequest::new(user_id, target_id, status).validate()?;

        if status == MatchStatus::Mutual {
            return Err(MatchError::ReservedStatus(status));
        }

        let mut tx = self.repository.begin().await?;
        tx.lock_pair(user_id, target_id).await?;

        let record = match tx.find_match(user_id, target_id).await? {
            Some(existing) => {
                if !existing.status.can_transition_to(status) {
                    tracing::info!(
                        "Refused match transition {} -> {}: {} -> {}",
                        user_id,
                        target_id,
                        existing.status,
                        status
                    );
                    return Err(MatchError::InvalidTransition {
                        from: existing.status,
                        to: status,
                    });
                }
                tx.update_match_status(existing.id, status, existing.next_updated_at())
                    .await?
            }
            None => {
                if !status.is_valid_initial() {
                    return Err(MatchError::InvalidInitialStatus(status));
                }
                let record = Match::new(user_id, target_id, status);
                tx.insert_match(&record).await?;
                record
            }
        };

        if record.status != MatchStatus::Accepted {
            tx.commit().await?;
            tracing::info!("Match {} -> {} is now {}", user_id, target_id, record.status);
            return Ok(record);
        }

        match complete_mutual_match(tx.as_mut(), &record).await {
            Ok(Some(mutual)) => {
                tx.commit().await.map_err(MatchError::MutualMatchAborted)?;
                tracing::info!("Mutual match between {} and {}", user_id, target_id);
                Ok(mutual)
            }
            Ok(None) => {
                tx.commit().await?;
                tracing::info!("Match {} -> {} is now {}", user_id, target_id, record.status);
                Ok(record)
            }
            Err(e) => {
                tracing::warn!("Mutual match {} <-> {} rolled back: {}", user_id, target_id, e);
                Err(MatchError::MutualMatchAborted(e))
            }
        }
    }

    /// Outgoing match records of a user, newest first
    pub async fn user_matches(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        page: MatchPage,
    ) -> Result<Vec<Match>, MatchError> {
        page.validate()?;
        Ok(self
            .repository
            .list_matches(user_id, status, page.limit, page.offset)
            .await?)
    }

    /// Ids of the users sharing a mutual match with `user_id`
    pub async fn mutual_partners(&self, user_id: &str) -> Result<Vec<String>, MatchError> {
        Ok(self.repository.mutual_partner_ids(user_id).await?)
    }

    pub async fn conversation_between(&self, a: &str, b: &str) -> Result<Option<Conversation>, MatchError> {
        Ok(self.repository.find_conversation(a, b).await?)
    }
}

/// Promote an accepted record and its accepted reciprocal to `mutual`
///
/// Returns the promoted record, or `None` when the other side has not accepted.
async fn complete_mutual_match(
    tx: &mut dyn MatchTransaction,
    record: &Match,
) -> RepositoryResult<Option<Match>> {
    let reciprocal = match tx.find_match(&record.target_id, &record.user_id).await? {
        Some(reciprocal) if reciprocal.status == MatchStatus::Accepted => reciprocal,
        _ => return Ok(None),
    };

    let now = Utc::now();
    let promoted = tx.update_match_status(record.id, MatchStatus::Mutual, now).await?;
    tx.update_match_status(reciprocal.id, MatchStatus::Mutual, now).await?;

    if tx.find_conversation(&record.user_id, &record.target_id).await?.is_none() {
        tx.insert_conversation(&Conversation::new(&record.user_id, &record.target_id))
            .await?;
    }

    Ok(Some(promoted))
}

/// Filter, score, order, and truncate a candidate set
///
/// Ties on score are broken by user id so identical inputs always rank
/// identically.
pub fn rank_profiles(
    seeker: &Profile,
    filter: &CandidateFilter,
    candidates: Vec<Profile>,
    config: &ScoringConfig,
) -> Vec<ScoredCandidate> {
    // Collapse repeated ids to their best-scoring entry
    let mut best: HashMap<String, ScoredCandidate> = HashMap::new();
    for profile in candidates
        .into_iter()
        .filter(|profile| matches_candidate_filter(profile, filter))
    {
        let score = calculate_match_score(seeker, &profile, config);
        let candidate = ScoredCandidate {
            profile,
            score: score.total,
            distance_km: score.distance_km,
        };
        match best.entry(candidate.profile.user_id.clone()) {
            Entry::Occupied(mut slot) => {
                if candidate.score.total_cmp(&slot.get().score).is_lt() {
                    slot.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }

    let mut scored: Vec<ScoredCandidate> = best.into_values().collect();
    scored.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
    });

    scored.truncate(config.max_results);
    scored
}

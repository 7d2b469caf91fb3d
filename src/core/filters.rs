use std::collections::HashSet;

use crate::models::{CandidateFilter, Interaction, InteractionType, Profile};

/// Whether the seeker may be ranked at all
///
/// Stage 1 of the pipeline. An inactive or half-filled profile simply has no
/// candidates.
#[inline]
pub fn is_ready_to_match(seeker: &Profile) -> bool {
    seeker.is_active() && seeker.is_complete()
}

/// Build the set of users the seeker already liked or disliked
///
/// Reports are ignored here, a reported user may still be ranked.
pub fn build_exclusion_set(interactions: &[Interaction]) -> HashSet<String> {
    interactions
        .iter()
        .filter(|i| i.interaction_type.excludes_from_ranking())
        .map(|i| i.target_user_id.clone())
        .collect()
}

/// Check that each side's preference accepts the other's gender
#[inline]
pub fn genders_compatible(seeker: &Profile, candidate: &Profile) -> bool {
    match (
        seeker.gender,
        seeker.preference_gender,
        candidate.gender,
        candidate.preference_gender,
    ) {
        (Some(seeker_gender), Some(seeker_pref), Some(candidate_gender), Some(candidate_pref)) => {
            seeker_pref.accepts(candidate_gender) && candidate_pref.accepts(seeker_gender)
        }
        _ => false,
    }
}

/// Check a candidate against the candidate query
///
/// Stage 2. Applied to whatever the repository returns, so the repository is
/// free to over-fetch.
#[inline]
pub fn matches_candidate_filter(candidate: &Profile, filter: &CandidateFilter) -> bool {
    if candidate.user_id == filter.seeker_id {
        return false;
    }

    if filter.exclude_user_ids.contains(&candidate.user_id) {
        return false;
    }

    if !candidate.is_active() || !candidate.is_complete() {
        return false;
    }

    match (candidate.gender, candidate.preference_gender) {
        (Some(gender), Some(pref)) => {
            filter.seeker_preference.accepts(gender) && pref.accepts(filter.seeker_gender)
        }
        _ => false,
    }
}

/// Most recent like/dislike/report from `actor` about `target`
///
/// When several interactions exist for the pair the latest one wins; on equal
/// timestamps the one appearing last in the slice wins.
pub fn latest_interaction<'a>(
    interactions: &'a [Interaction],
    actor: &str,
    target: &str,
) -> Option<&'a Interaction> {
    interactions
        .iter()
        .filter(|i| i.actor_user_id == actor && i.target_user_id == target)
        .fold(None, |latest: Option<&Interaction>, i| match latest {
            Some(current) if current.created_at > i.created_at => Some(current),
            _ => Some(i),
        })
}

pub fn has_liked(interactions: &[Interaction], actor: &str, target: &str) -> bool {
    latest_interaction(interactions, actor, target)
        .map(|i| i.interaction_type == InteractionType::Like)
        .unwrap_or(false)
}

pub fn has_disliked(interactions: &[Interaction], actor: &str, target: &str) -> bool {
    latest_interaction(interactions, actor, target)
        .map(|i| i.interaction_type == InteractionType::Dislike)
        .unwrap_or(false)
}

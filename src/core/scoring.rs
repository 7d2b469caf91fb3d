use crate::core::distance::profile_distance;
use crate::models::{Profile, ScoringConfig};

/// Breakdown of a candidate's score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub total: f64,
    /// Raw great-circle distance, `None` when the distance penalty was applied
    pub distance_km: Option<f64>,
}

/// Calculate a match score for a candidate; lower is better
///
/// Scoring formula:
/// score = distance_km + age_weight * |seeker.age - candidate.age|
///
/// Missing coordinates on either side substitute `distance_penalty_km` for the
/// distance term; a missing age substitutes `age_penalty` for the age term.
pub fn calculate_match_score(
    seeker: &Profile,
    candidate: &Profile,
    config: &ScoringConfig,
) -> ScoreBreakdown {
    let distance_km = profile_distance(seeker, candidate);
    let distance_term = distance_km.unwrap_or(config.distance_penalty_km);

    let age_term = calculate_age_term(seeker.age, candidate.age, config);

    ScoreBreakdown {
        total: distance_term + age_term,
        distance_km,
    }
}

#[inline]
fn calculate_age_term(seeker_age: Option<u8>, candidate_age: Option<u8>, config: &ScoringConfig) -> f64 {
    match (seeker_age, candidate_age) {
        (Some(a), Some(b)) => config.age_weight * f64::from(a.abs_diff(b)),
        _ => config.age_penalty,
    }
}

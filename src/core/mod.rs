// Core algorithm exports
pub mod distance;
pub mod filters;
pub mod matcher;
pub mod scoring;
pub mod transitions;

pub use distance::{haversine_distance, profile_distance, EARTH_RADIUS_KM};
pub use filters::{
    build_exclusion_set, genders_compatible, has_disliked, has_liked, is_ready_to_match,
    latest_interaction, matches_candidate_filter,
};
pub use matcher::{rank_profiles, MatchError, Matcher};
pub use scoring::{calculate_match_score, ScoreBreakdown};

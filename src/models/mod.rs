// Model exports
pub mod domain;
pub mod requests;

pub use domain::{
    CandidateFilter, Conversation, Gender, GenderPreference, Interaction, InteractionType, Match,
    MatchStatus, Profile, ProfileStatus, ScoredCandidate, ScoringConfig,
};
pub use requests::{AdvanceMatchRequest, MatchPage};

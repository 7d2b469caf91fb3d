//! Matchbot core - candidate matching and session state for a matchmaking chat bot
//!
//! Two independent pieces live here:
//!
//! - [`Matcher`] ranks candidates for a seeker, drives the match status state
//!   machine and turns reciprocal acceptance into a mutual match with a
//!   conversation, all behind the [`ProfileRepository`] and
//!   [`MatchRepository`] ports.
//! - [`SessionStore`] keeps short-lived per-user conversational state with a
//!   sliding TTL and an optional background sweep.

pub mod config;
pub mod core;
pub mod models;
pub mod services;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use crate::config::Settings;
pub use crate::core::{haversine_distance, MatchError, Matcher};
pub use crate::models::{
    AdvanceMatchRequest, Conversation, Interaction, InteractionType, Match, MatchPage, MatchStatus,
    Profile, ScoredCandidate, ScoringConfig,
};
pub use crate::services::{
    InMemoryRepository, MatchRepository, MatchTransaction, PgRepository, ProfileRepository,
    RepositoryError,
};
pub use crate::session::{Session, SessionError, SessionState, SessionStore};
pub use crate::telemetry::init_tracing;

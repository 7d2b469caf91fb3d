use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Stated gender of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Which gender(s) a profile wants to be matched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gender_preference", rename_all = "lowercase")]
pub enum GenderPreference {
    Male,
    Female,
    Both,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl GenderPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            GenderPreference::Male => "male",
            GenderPreference::Female => "female",
            GenderPreference::Both => "both",
        }
    }

    /// Whether this preference accepts a partner of the given gender
    #[inline]
    pub fn accepts(self, gender: Gender) -> bool {
        match self {
            GenderPreference::Both => true,
            GenderPreference::Male => gender == Gender::Male,
            GenderPreference::Female => gender == Gender::Female,
        }
    }
}

/// Account status of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "profile_status", rename_all = "lowercase")]
pub enum ProfileStatus {
    Active,
    Inactive,
    Banned,
    Deleted,
}

/// User profile with the attributes the matching engine works on
///
/// Everything except the id and status is optional until the user finishes
/// onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(rename = "preferenceGender", default)]
    pub preference_gender: Option<GenderPreference>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub status: ProfileStatus,
}

impl Profile {
    /// A profile can take part in matching only once every matching attribute is set
    pub fn is_complete(&self) -> bool {
        self.gender.is_some()
            && self.preference_gender.is_some()
            && self.age.is_some()
            && self.latitude.is_some()
            && self.longitude.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == ProfileStatus::Active
    }

    /// Coordinates as a pair, if both are set
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Kind of interaction one user recorded about another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "interaction_type", rename_all = "lowercase")]
pub enum InteractionType {
    Like,
    Dislike,
    Report,
}

impl InteractionType {
    /// Likes and dislikes hide the target from future rankings; reports do not
    pub fn excludes_from_ranking(self) -> bool {
        matches!(self, InteractionType::Like | InteractionType::Dislike)
    }
}

/// Like/dislike/report record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_interaction_parties", skip_on_field_errors = false))]
pub struct Interaction {
    #[validate(length(min = 1))]
    #[serde(rename = "actorUserId")]
    pub actor_user_id: String,
    #[validate(length(min = 1))]
    #[serde(rename = "targetUserId")]
    pub target_user_id: String,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(rename = "reportReason", default)]
    pub report_reason: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(actor_user_id: &str, target_user_id: &str, interaction_type: InteractionType) -> Self {
        Self {
            actor_user_id: actor_user_id.to_string(),
            target_user_id: target_user_id.to_string(),
            interaction_type,
            report_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn report(actor_user_id: &str, target_user_id: &str, reason: &str) -> Self {
        Self {
            report_reason: Some(reason.to_string()),
            ..Self::new(actor_user_id, target_user_id, InteractionType::Report)
        }
    }
}

fn validate_interaction_parties(interaction: &Interaction) -> Result<(), ValidationError> {
    if interaction.actor_user_id == interaction.target_user_id {
        return Err(ValidationError::new("self_interaction"));
    }
    Ok(())
}

/// Status of a directed match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Mutual,
    Completed,
    Ended,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
            MatchStatus::Mutual => "mutual",
            MatchStatus::Completed => "completed",
            MatchStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed match record from `user_id` towards `target_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    pub status: MatchStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn new(user_id: &str, target_id: &str, status: MatchStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            target_id: target_id.to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Timestamp to stamp on an update, never earlier than `created_at`
    pub fn next_updated_at(&self) -> DateTime<Utc> {
        Utc::now().max(self.created_at)
    }
}

/// Chat channel opened once for every mutual match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(rename = "user1Id")]
    pub user1_id: String,
    #[serde(rename = "user2Id")]
    pub user2_id: String,
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<String>,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user1_id: &str, user2_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user1_id: user1_id.to_string(),
            user2_id: user2_id.to_string(),
            last_message: None,
            last_activity: now,
            created_at: now,
        }
    }

    /// Whether this conversation links the two users, in either order
    pub fn links(&self, a: &str, b: &str) -> bool {
        (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
    }
}

/// Ranked candidate result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub profile: Profile,
    /// Lower is better
    pub score: f64,
    /// Great-circle distance, absent when either side had no coordinates
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
}

/// Criteria handed to the repository when fetching candidates
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub seeker_id: String,
    pub seeker_gender: Gender,
    pub seeker_preference: GenderPreference,
    pub exclude_user_ids: HashSet<String>,
}

/// Scoring constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Distance term used when either party has no coordinates
    pub distance_penalty_km: f64,
    /// Age term used when either party has no age
    pub age_penalty: f64,
    /// Multiplier on the absolute age difference
    pub age_weight: f64,
    /// Number of candidates returned by a ranking
    pub max_results: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            distance_penalty_km: 10_000.0,
            age_penalty: 50.0,
            age_weight: 0.5,
            max_results: 5,
        }
    }
}

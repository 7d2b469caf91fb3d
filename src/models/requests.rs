use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::domain::MatchStatus;

/// Request to create or advance a match record
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_distinct_users", skip_on_field_errors = false))]
pub struct AdvanceMatchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "target_id", rename = "targetId")]
    pub target_id: String,
    pub status: MatchStatus,
}

impl AdvanceMatchRequest {
    pub fn new(user_id: &str, target_id: &str, status: MatchStatus) -> Self {
        Self {
            user_id: user_id.to_string(),
            target_id: target_id.to_string(),
            status,
        }
    }
}

fn validate_distinct_users(req: &AdvanceMatchRequest) -> Result<(), ValidationError> {
    if req.user_id == req.target_id {
        return Err(ValidationError::new("self_match"));
    }
    Ok(())
}

/// Paging for match listings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct MatchPage {
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for MatchPage {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> u32 {
    50
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const REWARD_CLAIMABLE: &str = "CLAIMABLE";
pub const REWARD_CLAIMED: &str = "CLAIMED";
pub const REWARD_EXPIRED: &str = "EXPIRED";

/// One tier of the progression ladder. `order_index` and `code` are unique;
/// thresholds are non-decreasing with order by convention.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct LevelDefinition {
    pub id: String,
    pub code: String,
    pub name: String,
    pub order_index: i32,
    pub threshold_points: i64,
}

/// Per-user progression row. After every evaluation the referenced level's
/// threshold is at most `points`.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct LevelProgress {
    pub user_id: String,
    pub points: i64,
    pub current_level_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub expires_in_days: Option<i32>,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct UserReward {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub correlation_id: String,
    pub status: String,
    pub expires_at: Option<NaiveDateTime>,
    pub claimed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl UserReward {
    pub fn is_claimable(&self) -> bool {
        self.status == REWARD_CLAIMABLE
    }

    /// A reward with no expiry timestamp never auto-expires.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

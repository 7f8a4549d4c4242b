use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Checkout {
    pub id: String,
    pub user_id: String,
    pub slug: String,
    pub name: String,
    pub active: bool,
    pub created_at: chrono::NaiveDateTime,
}

/// A/B variant of a checkout. `traffic_share` is a percentage in [0, 100];
/// the shares of a checkout's active variants sum to at most 100. `views`
/// and `conversions` only ever increase.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct CheckoutVariant {
    pub id: String,
    pub checkout_id: String,
    pub name: String,
    pub traffic_share: i32,
    pub views: i64,
    pub conversions: i64,
    pub active: bool,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub traffic_share: i32,
}

use serde::{Deserialize, Serialize};

pub const DIRECTION_INCOMING: &str = "INCOMING";
pub const DIRECTION_OUTGOING: &str = "OUTGOING";

pub const STATUS_PAID: &str = "PAID";

/// Immutable ledger event. Rows are never deleted; only status, fee and
/// metadata transitions are applied after creation.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub direction: String,
    pub status: String,
    pub method: String,
    pub metadata: serde_json::Value,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct TransactionSplit {
    pub id: String,
    pub transaction_id: String,
    pub recipient_email: String,
    pub amount_in_cents: i64,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSplit {
    pub transaction_id: String,
    pub amount_in_cents: i64,
    pub recipient_email: String,
}

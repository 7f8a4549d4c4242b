use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Derived per-day balance snapshot.
///
/// Invariants maintained by the ledger aggregator:
/// `final_balance == initial_balance + entradas - saidas` and the opening
/// balance of each day equals the closing balance of the previous day for
/// the same user.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Statement {
    pub user_id: String,
    pub as_of_date: NaiveDate,
    pub initial_balance_in_cents: i64,
    pub entradas_in_cents: i64,
    pub saidas_in_cents: i64,
    pub final_balance_in_cents: i64,
    pub transaction_count: i64,
    pub variation_in_cents: i64,
}

/// Aggregated PAID transaction activity for one calendar day, as read from
/// the transaction log. Days with no activity have no row.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DayActivity {
    pub day: NaiveDate,
    pub entradas_in_cents: i64,
    pub saidas_in_cents: i64,
    pub transaction_count: i64,
}

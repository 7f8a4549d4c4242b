use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::statements::{DayActivity, Statement};
use crate::models::transactions::{DIRECTION_INCOMING, DIRECTION_OUTGOING, STATUS_PAID};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Closing balance of the most recent statement dated strictly before
    /// `day`. When several rows exist for the same day the last one by
    /// creation timestamp wins.
    async fn final_balance_before(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<i64>, anyhow::Error>;

    /// Per-day PAID activity for the inclusive range, ascending. Days with
    /// no activity are absent from the result.
    async fn daily_activity(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayActivity>, anyhow::Error>;

    async fn upsert_statements(&self, statements: &[Statement]) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct PgLedgerRepository {
    conn: PgPool,
}

impl PgLedgerRepository {
    pub fn new(conn: PgPool) -> Self {
        PgLedgerRepository { conn }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerRepository {
    async fn final_balance_before(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<i64>, anyhow::Error> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"SELECT final_balance_in_cents FROM statements
            WHERE user_id = $1 AND as_of_date < $2
            ORDER BY as_of_date DESC, created_at DESC
            LIMIT 1"#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&self.conn)
        .await?;

        Ok(balance)
    }

    async fn daily_activity(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayActivity>, anyhow::Error> {
        let activity = sqlx::query_as::<_, DayActivity>(
            r#"SELECT CAST(created_at AS DATE) AS day,
            CAST(COALESCE(SUM(CASE WHEN direction = $4 THEN amount_in_cents ELSE 0 END), 0) AS BIGINT) AS entradas_in_cents,
            CAST(COALESCE(SUM(CASE WHEN direction = $5 THEN amount_in_cents ELSE 0 END), 0) AS BIGINT) AS saidas_in_cents,
            COUNT(1) AS transaction_count
            FROM transactions
            WHERE user_id = $1 AND status = $6
            AND CAST(created_at AS DATE) BETWEEN $2 AND $3
            GROUP BY 1
            ORDER BY 1"#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(DIRECTION_INCOMING)
        .bind(DIRECTION_OUTGOING)
        .bind(STATUS_PAID)
        .fetch_all(&self.conn)
        .await?;

        Ok(activity)
    }

    async fn upsert_statements(&self, statements: &[Statement]) -> Result<(), anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        for statement in statements {
            sqlx::query(
                r#"INSERT INTO statements
                (user_id, as_of_date, initial_balance_in_cents, entradas_in_cents,
                 saidas_in_cents, final_balance_in_cents, transaction_count, variation_in_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_id, as_of_date) DO UPDATE SET
                initial_balance_in_cents = EXCLUDED.initial_balance_in_cents,
                entradas_in_cents = EXCLUDED.entradas_in_cents,
                saidas_in_cents = EXCLUDED.saidas_in_cents,
                final_balance_in_cents = EXCLUDED.final_balance_in_cents,
                transaction_count = EXCLUDED.transaction_count,
                variation_in_cents = EXCLUDED.variation_in_cents,
                created_at = CURRENT_TIMESTAMP"#,
            )
            .bind(&statement.user_id)
            .bind(statement.as_of_date)
            .bind(statement.initial_balance_in_cents)
            .bind(statement.entradas_in_cents)
            .bind(statement.saidas_in_cents)
            .bind(statement.final_balance_in_cents)
            .bind(statement.transaction_count)
            .bind(statement.variation_in_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}

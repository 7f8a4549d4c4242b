use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::transactions::{NewSplit, Transaction, TransactionSplit};

/// Result of a split creation attempt. The sum check is a hard gate: no
/// rebalancing or proportional adjustment is ever applied.
pub enum SplitOutcome {
    Created(TransactionSplit),
    TransactionNotFound,
    AmountOverflow {
        transaction_amount_in_cents: i64,
        existing_splits_in_cents: i64,
    },
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Creates a `PENDING` split if the transaction exists, belongs to the
    /// user and the existing splits plus the new amount fit inside the
    /// transaction amount. The read-check-write runs in one serializable
    /// database transaction so concurrent creations cannot jointly exceed
    /// the limit.
    async fn create_split(
        &self,
        user_id: &str,
        split: &NewSplit,
    ) -> Result<SplitOutcome, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgTransactionRepository {
    conn: PgPool,
}

impl PgTransactionRepository {
    pub fn new(conn: PgPool) -> Self {
        PgTransactionRepository { conn }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionRepository {
    async fn create_split(
        &self,
        user_id: &str,
        split: &NewSplit,
    ) -> Result<SplitOutcome, anyhow::Error> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 AND user_id = $2",
        )
        .bind(&split.transaction_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let transaction = match transaction {
            Some(transaction) => transaction,
            None => return Ok(SplitOutcome::TransactionNotFound),
        };

        let existing: i64 = sqlx::query_scalar(
            r#"SELECT CAST(COALESCE(SUM(amount_in_cents), 0) AS BIGINT)
            FROM transaction_splits WHERE transaction_id = $1"#,
        )
        .bind(&split.transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        if existing + split.amount_in_cents > transaction.amount_in_cents {
            return Ok(SplitOutcome::AmountOverflow {
                transaction_amount_in_cents: transaction.amount_in_cents,
                existing_splits_in_cents: existing,
            });
        }

        let split_id = Uuid::new_v4().hyphenated().to_string();
        let created = sqlx::query_as::<_, TransactionSplit>(
            r#"INSERT INTO transaction_splits
            (id, transaction_id, recipient_email, amount_in_cents, status)
            VALUES ($1, $2, $3, $4, 'PENDING')
            RETURNING *"#,
        )
        .bind(&split_id)
        .bind(&split.transaction_id)
        .bind(&split.recipient_email)
        .bind(split.amount_in_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SplitOutcome::Created(created))
    }
}

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::checkouts::{Checkout, CheckoutVariant, NewVariant};

pub enum VariantOutcome {
    Created(CheckoutVariant),
    CheckoutNotFound,
    ShareOverflow { existing_share_sum: i64 },
}

#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Checkout>, anyhow::Error>;

    /// Active variants of a checkout in creation order. Selection walks this
    /// order, so it must be stable across calls.
    async fn active_variants(
        &self,
        checkout_id: &str,
    ) -> Result<Vec<CheckoutVariant>, anyhow::Error>;

    async fn record_view(&self, variant_id: &str) -> Result<(), anyhow::Error>;

    /// Creates a variant if the checkout belongs to the user and the active
    /// traffic shares plus the new one stay within 100. Runs in a single
    /// serializable transaction.
    async fn create_variant(
        &self,
        user_id: &str,
        checkout_id: &str,
        variant: &NewVariant,
    ) -> Result<VariantOutcome, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgCheckoutRepository {
    conn: PgPool,
}

impl PgCheckoutRepository {
    pub fn new(conn: PgPool) -> Self {
        PgCheckoutRepository { conn }
    }
}

#[async_trait]
impl CheckoutStore for PgCheckoutRepository {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Checkout>, anyhow::Error> {
        let checkout = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE slug = $1 AND active = TRUE",
        )
        .bind(slug)
        .fetch_optional(&self.conn)
        .await?;

        Ok(checkout)
    }

    async fn active_variants(
        &self,
        checkout_id: &str,
    ) -> Result<Vec<CheckoutVariant>, anyhow::Error> {
        let variants = sqlx::query_as::<_, CheckoutVariant>(
            r#"SELECT * FROM checkout_variants
            WHERE checkout_id = $1 AND active = TRUE
            ORDER BY created_at, id"#,
        )
        .bind(checkout_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(variants)
    }

    async fn record_view(&self, variant_id: &str) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE checkout_variants SET views = views + 1 WHERE id = $1")
            .bind(variant_id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn create_variant(
        &self,
        user_id: &str,
        checkout_id: &str,
        variant: &NewVariant,
    ) -> Result<VariantOutcome, anyhow::Error> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let checkout = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE id = $1 AND user_id = $2",
        )
        .bind(checkout_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if checkout.is_none() {
            return Ok(VariantOutcome::CheckoutNotFound);
        }

        let existing_share_sum: i64 = sqlx::query_scalar(
            r#"SELECT CAST(COALESCE(SUM(traffic_share), 0) AS BIGINT)
            FROM checkout_variants WHERE checkout_id = $1 AND active = TRUE"#,
        )
        .bind(checkout_id)
        .fetch_one(&mut *tx)
        .await?;

        if existing_share_sum + variant.traffic_share as i64 > 100 {
            return Ok(VariantOutcome::ShareOverflow { existing_share_sum });
        }

        let variant_id = Uuid::new_v4().hyphenated().to_string();
        let created = sqlx::query_as::<_, CheckoutVariant>(
            r#"INSERT INTO checkout_variants (id, checkout_id, name, traffic_share)
            VALUES ($1, $2, $3, $4)
            RETURNING *"#,
        )
        .bind(&variant_id)
        .bind(checkout_id)
        .bind(&variant.name)
        .bind(variant.traffic_share)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VariantOutcome::Created(created))
    }
}

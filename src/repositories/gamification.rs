use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::gamification::{LevelDefinition, LevelProgress, Reward, UserReward};

#[async_trait]
pub trait GamificationStore: Send + Sync {
    async fn levels_ordered(&self) -> Result<Vec<LevelDefinition>, anyhow::Error>;

    async fn find_progress(&self, user_id: &str) -> Result<Option<LevelProgress>, anyhow::Error>;

    /// Creates the progress row with zero points, racing creations collapse
    /// to a single row.
    async fn init_progress(
        &self,
        user_id: &str,
        current_level_id: Option<&str>,
    ) -> Result<LevelProgress, anyhow::Error>;

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64, anyhow::Error>;

    async fn default_rewards_for_level(
        &self,
        level_id: &str,
    ) -> Result<Vec<Reward>, anyhow::Error>;

    /// Moves the user to `level_id` and grants the level's default rewards.
    /// Grants are keyed on `(user_id, correlation_id, reward_id)`, so
    /// re-applying the same crossing inserts nothing. Runs in a single
    /// serializable transaction.
    async fn apply_level_up(
        &self,
        user_id: &str,
        level_id: &str,
        correlation_id: &str,
        rewards: &[Reward],
    ) -> Result<(), anyhow::Error>;

    async fn find_user_reward(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error>;

    /// Transitions a `CLAIMABLE` reward to `CLAIMED`. Returns `None` when
    /// the reward is already in a terminal state; terminal states are never
    /// overwritten.
    async fn mark_claimed(
        &self,
        id: &str,
        claimed_at: NaiveDateTime,
    ) -> Result<Option<UserReward>, anyhow::Error>;

    /// Transitions a `CLAIMABLE` reward to `EXPIRED`, `None` when it is
    /// already terminal.
    async fn mark_expired(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgGamificationRepository {
    conn: PgPool,
}

impl PgGamificationRepository {
    pub fn new(conn: PgPool) -> Self {
        PgGamificationRepository { conn }
    }
}

#[async_trait]
impl GamificationStore for PgGamificationRepository {
    async fn levels_ordered(&self) -> Result<Vec<LevelDefinition>, anyhow::Error> {
        let levels = sqlx::query_as::<_, LevelDefinition>(
            "SELECT * FROM levels ORDER BY order_index",
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(levels)
    }

    async fn find_progress(&self, user_id: &str) -> Result<Option<LevelProgress>, anyhow::Error> {
        let progress = sqlx::query_as::<_, LevelProgress>(
            "SELECT user_id, points, current_level_id FROM level_progress WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(progress)
    }

    async fn init_progress(
        &self,
        user_id: &str,
        current_level_id: Option<&str>,
    ) -> Result<LevelProgress, anyhow::Error> {
        let inserted = sqlx::query_as::<_, LevelProgress>(
            r#"INSERT INTO level_progress (user_id, points, current_level_id)
            VALUES ($1, 0, $2)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id, points, current_level_id"#,
        )
        .bind(user_id)
        .bind(current_level_id)
        .fetch_optional(&self.conn)
        .await?;

        match inserted {
            Some(progress) => Ok(progress),
            // Lost the race, the existing row wins.
            None => {
                let progress = self.find_progress(user_id).await?;
                progress.ok_or_else(|| anyhow::anyhow!("progress row vanished: {}", user_id))
            }
        }
    }

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64, anyhow::Error> {
        let points: i64 = sqlx::query_scalar(
            r#"INSERT INTO level_progress (user_id, points)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
            points = level_progress.points + EXCLUDED.points,
            updated_at = CURRENT_TIMESTAMP
            RETURNING points"#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.conn)
        .await?;

        Ok(points)
    }

    async fn default_rewards_for_level(
        &self,
        level_id: &str,
    ) -> Result<Vec<Reward>, anyhow::Error> {
        let rewards = sqlx::query_as::<_, Reward>(
            r#"SELECT r.id, r.name, r.expires_in_days
            FROM rewards r
            JOIN level_rewards lr ON lr.reward_id = r.id
            WHERE lr.level_id = $1
            ORDER BY r.id"#,
        )
        .bind(level_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(rewards)
    }

    async fn apply_level_up(
        &self,
        user_id: &str,
        level_id: &str,
        correlation_id: &str,
        rewards: &[Reward],
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"UPDATE level_progress
            SET current_level_id = $2, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1"#,
        )
        .bind(user_id)
        .bind(level_id)
        .execute(&mut *tx)
        .await?;

        let now = Utc::now().naive_utc();
        for reward in rewards {
            let expires_at = reward
                .expires_in_days
                .map(|days| now + Duration::days(days as i64));

            sqlx::query(
                r#"INSERT INTO user_rewards
                (id, user_id, reward_id, correlation_id, status, expires_at)
                VALUES ($1, $2, $3, $4, 'CLAIMABLE', $5)
                ON CONFLICT (user_id, correlation_id, reward_id) DO NOTHING"#,
            )
            .bind(Uuid::new_v4().hyphenated().to_string())
            .bind(user_id)
            .bind(&reward.id)
            .bind(correlation_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn find_user_reward(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error> {
        let reward = sqlx::query_as::<_, UserReward>("SELECT * FROM user_rewards WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(reward)
    }

    async fn mark_claimed(
        &self,
        id: &str,
        claimed_at: NaiveDateTime,
    ) -> Result<Option<UserReward>, anyhow::Error> {
        let reward = sqlx::query_as::<_, UserReward>(
            r#"UPDATE user_rewards SET status = 'CLAIMED', claimed_at = $2
            WHERE id = $1 AND status = 'CLAIMABLE'
            RETURNING *"#,
        )
        .bind(id)
        .bind(claimed_at)
        .fetch_optional(&self.conn)
        .await?;

        Ok(reward)
    }

    async fn mark_expired(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error> {
        let reward = sqlx::query_as::<_, UserReward>(
            r#"UPDATE user_rewards SET status = 'EXPIRED'
            WHERE id = $1 AND status = 'CLAIMABLE'
            RETURNING *"#,
        )
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(reward)
    }
}

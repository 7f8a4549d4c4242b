use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::gamification::{LevelDefinition, UserReward};
use crate::repositories::gamification::{GamificationStore, PgGamificationRepository};

pub enum GamificationRequest {
    GetProgress {
        user_id: String,
        response: oneshot::Sender<Result<ProgressView, ServiceError>>,
    },
    AddPoints {
        user_id: String,
        amount: i64,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
    ClaimReward {
        user_id: String,
        reward_id: String,
        response: oneshot::Sender<Result<UserReward, ServiceError>>,
    },
}

#[derive(Serialize)]
pub struct ProgressView {
    pub points: i64,
    pub current_level: Option<LevelDefinition>,
}

/// Finds the level the user should advance to: the highest-order level whose
/// threshold is covered by `points` and whose order is strictly above the
/// current one. Transitions only move forward; there is no demotion.
pub fn evaluate_level_up<'a>(
    levels: &'a [LevelDefinition],
    points: i64,
    current_order: Option<i32>,
) -> Option<&'a LevelDefinition> {
    levels
        .iter()
        .filter(|level| level.threshold_points <= points)
        .filter(|level| match current_order {
            Some(order) => level.order_index > order,
            None => true,
        })
        .max_by_key(|level| level.order_index)
}

#[derive(Clone)]
pub struct GamificationRequestHandler {
    repository: Arc<dyn GamificationStore>,
}

impl GamificationRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        GamificationRequestHandler {
            repository: Arc::new(PgGamificationRepository::new(sql_conn)),
        }
    }

    pub fn with_store(repository: Arc<dyn GamificationStore>) -> Self {
        GamificationRequestHandler { repository }
    }

    /// Reads the user's progress, initializing it at the lowest level when
    /// missing, then applies any pending level-up. Granting is keyed on a
    /// correlation id derived from the crossing, so running this twice in a
    /// row hands out each reward at most once.
    async fn get_progress(&self, user_id: &str) -> Result<ProgressView, ServiceError> {
        let levels = self
            .repository
            .levels_ordered()
            .await
            .map_err(|e| repository_error(e))?;

        let progress = match self
            .repository
            .find_progress(user_id)
            .await
            .map_err(|e| repository_error(e))?
        {
            Some(progress) => progress,
            None => {
                let lowest = levels.first().map(|level| level.id.as_str());
                self.repository
                    .init_progress(user_id, lowest)
                    .await
                    .map_err(|e| repository_error(e))?
            }
        };

        let current = progress
            .current_level_id
            .as_deref()
            .and_then(|id| levels.iter().find(|level| level.id == id));

        let current_level = match evaluate_level_up(
            &levels,
            progress.points,
            current.map(|level| level.order_index),
        ) {
            Some(target) => {
                let rewards = self
                    .repository
                    .default_rewards_for_level(&target.id)
                    .await
                    .map_err(|e| repository_error(e))?;
                let correlation_id = format!("levelup:{}:{}", user_id, target.id);

                self.repository
                    .apply_level_up(user_id, &target.id, &correlation_id, &rewards)
                    .await
                    .map_err(|e| repository_error(e))?;

                log::info!(
                    "User {} leveled up to {} ({} rewards granted)",
                    user_id,
                    target.code,
                    rewards.len()
                );

                Some(target.clone())
            }
            None => current.cloned(),
        };

        Ok(ProgressView {
            points: progress.points,
            current_level,
        })
    }

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(format!(
                "points amount must be greater than zero, got {}",
                amount
            )));
        }

        self.repository
            .add_points(user_id, amount)
            .await
            .map_err(|e| repository_error(e))
    }

    async fn claim_reward(
        &self,
        user_id: &str,
        reward_id: &str,
    ) -> Result<UserReward, ServiceError> {
        let reward = self
            .repository
            .find_user_reward(reward_id)
            .await
            .map_err(|e| repository_error(e))?
            .ok_or_else(|| ServiceError::NotFound(format!("reward not found: {}", reward_id)))?;

        if reward.user_id != user_id {
            return Err(ServiceError::NotFound(format!(
                "reward not found: {}",
                reward_id
            )));
        }

        if !reward.is_claimable() {
            return Err(ServiceError::Validation(format!(
                "reward is not claimable, status is {}",
                reward.status
            )));
        }

        let now = Utc::now().naive_utc();
        if reward.is_expired_at(now) {
            let _ = self
                .repository
                .mark_expired(reward_id)
                .await
                .map_err(|e| repository_error(e))?;

            return Err(ServiceError::Validation(format!(
                "reward expired at {}",
                reward.expires_at.unwrap_or(now)
            )));
        }

        // The update only touches CLAIMABLE rows; a concurrent claim or
        // expiry that won the race leaves nothing to claim here.
        self.repository
            .mark_claimed(reward_id, now)
            .await
            .map_err(|e| repository_error(e))?
            .ok_or_else(|| {
                ServiceError::Validation(format!("reward is not claimable: {}", reward_id))
            })
    }
}

fn repository_error(e: anyhow::Error) -> ServiceError {
    ServiceError::Repository("GamificationService".to_string(), e.to_string())
}

#[async_trait]
impl RequestHandler<GamificationRequest> for GamificationRequestHandler {
    async fn handle_request(&self, request: GamificationRequest) {
        match request {
            GamificationRequest::GetProgress { user_id, response } => {
                let result = self.get_progress(&user_id).await;
                let _ = response.send(result);
            }
            GamificationRequest::AddPoints {
                user_id,
                amount,
                response,
            } => {
                let result = self.add_points(&user_id, amount).await;
                let _ = response.send(result);
            }
            GamificationRequest::ClaimReward {
                user_id,
                reward_id,
                response,
            } => {
                let result = self.claim_reward(&user_id, &reward_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct GamificationService;

impl GamificationService {
    pub fn new() -> Self {
        GamificationService {}
    }
}

#[async_trait]
impl Service<GamificationRequest, GamificationRequestHandler> for GamificationService {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{Duration, NaiveDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::models::gamification::{
        LevelProgress, Reward, REWARD_CLAIMABLE, REWARD_CLAIMED, REWARD_EXPIRED,
    };

    fn level(id: &str, order_index: i32, threshold_points: i64) -> LevelDefinition {
        LevelDefinition {
            id: id.to_string(),
            code: id.to_uppercase(),
            name: id.to_string(),
            order_index,
            threshold_points,
        }
    }

    fn reward(id: &str, expires_in_days: Option<i32>) -> Reward {
        Reward {
            id: id.to_string(),
            name: id.to_string(),
            expires_in_days,
        }
    }

    struct MemoryGamificationStore {
        levels: Vec<LevelDefinition>,
        level_rewards: HashMap<String, Vec<Reward>>,
        progress: Mutex<HashMap<String, LevelProgress>>,
        user_rewards: Mutex<Vec<UserReward>>,
    }

    impl MemoryGamificationStore {
        fn new(levels: Vec<LevelDefinition>, level_rewards: Vec<(&str, Vec<Reward>)>) -> Self {
            MemoryGamificationStore {
                levels,
                level_rewards: level_rewards
                    .into_iter()
                    .map(|(id, rewards)| (id.to_string(), rewards))
                    .collect(),
                progress: Mutex::new(HashMap::new()),
                user_rewards: Mutex::new(Vec::new()),
            }
        }

        fn push_reward(&self, user_id: &str, status: &str, expires_at: Option<NaiveDateTime>) -> String {
            let id = Uuid::new_v4().hyphenated().to_string();
            self.user_rewards.lock().unwrap().push(UserReward {
                id: id.clone(),
                user_id: user_id.to_string(),
                reward_id: "bonus".to_string(),
                correlation_id: "manual".to_string(),
                status: status.to_string(),
                expires_at,
                claimed_at: None,
                created_at: Utc::now().naive_utc(),
            });
            id
        }
    }

    #[async_trait]
    impl GamificationStore for MemoryGamificationStore {
        async fn levels_ordered(&self) -> Result<Vec<LevelDefinition>, anyhow::Error> {
            Ok(self.levels.clone())
        }

        async fn find_progress(
            &self,
            user_id: &str,
        ) -> Result<Option<LevelProgress>, anyhow::Error> {
            Ok(self.progress.lock().unwrap().get(user_id).cloned())
        }

        async fn init_progress(
            &self,
            user_id: &str,
            current_level_id: Option<&str>,
        ) -> Result<LevelProgress, anyhow::Error> {
            let mut progress = self.progress.lock().unwrap();
            let row = progress
                .entry(user_id.to_string())
                .or_insert_with(|| LevelProgress {
                    user_id: user_id.to_string(),
                    points: 0,
                    current_level_id: current_level_id.map(|id| id.to_string()),
                });
            Ok(row.clone())
        }

        async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64, anyhow::Error> {
            let mut progress = self.progress.lock().unwrap();
            let row = progress
                .entry(user_id.to_string())
                .or_insert_with(|| LevelProgress {
                    user_id: user_id.to_string(),
                    points: 0,
                    current_level_id: None,
                });
            row.points += amount;
            Ok(row.points)
        }

        async fn default_rewards_for_level(
            &self,
            level_id: &str,
        ) -> Result<Vec<Reward>, anyhow::Error> {
            Ok(self.level_rewards.get(level_id).cloned().unwrap_or_default())
        }

        async fn apply_level_up(
            &self,
            user_id: &str,
            level_id: &str,
            correlation_id: &str,
            rewards: &[Reward],
        ) -> Result<(), anyhow::Error> {
            if let Some(row) = self.progress.lock().unwrap().get_mut(user_id) {
                row.current_level_id = Some(level_id.to_string());
            }

            let mut user_rewards = self.user_rewards.lock().unwrap();
            for reward in rewards {
                let duplicate = user_rewards.iter().any(|r| {
                    r.user_id == user_id
                        && r.correlation_id == correlation_id
                        && r.reward_id == reward.id
                });
                if duplicate {
                    continue;
                }

                let now = Utc::now().naive_utc();
                user_rewards.push(UserReward {
                    id: Uuid::new_v4().hyphenated().to_string(),
                    user_id: user_id.to_string(),
                    reward_id: reward.id.clone(),
                    correlation_id: correlation_id.to_string(),
                    status: REWARD_CLAIMABLE.to_string(),
                    expires_at: reward
                        .expires_in_days
                        .map(|days| now + Duration::days(days as i64)),
                    claimed_at: None,
                    created_at: now,
                });
            }

            Ok(())
        }

        async fn find_user_reward(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error> {
            Ok(self
                .user_rewards
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned())
        }

        async fn mark_claimed(
            &self,
            id: &str,
            claimed_at: NaiveDateTime,
        ) -> Result<Option<UserReward>, anyhow::Error> {
            let mut user_rewards = self.user_rewards.lock().unwrap();
            let reward = user_rewards
                .iter_mut()
                .find(|r| r.id == id && r.status == REWARD_CLAIMABLE);
            Ok(reward.map(|reward| {
                reward.status = REWARD_CLAIMED.to_string();
                reward.claimed_at = Some(claimed_at);
                reward.clone()
            }))
        }

        async fn mark_expired(&self, id: &str) -> Result<Option<UserReward>, anyhow::Error> {
            let mut user_rewards = self.user_rewards.lock().unwrap();
            let reward = user_rewards
                .iter_mut()
                .find(|r| r.id == id && r.status == REWARD_CLAIMABLE);
            Ok(reward.map(|reward| {
                reward.status = REWARD_EXPIRED.to_string();
                reward.clone()
            }))
        }
    }

    fn two_level_store() -> Arc<MemoryGamificationStore> {
        Arc::new(MemoryGamificationStore::new(
            vec![level("bronze", 1, 0), level("silver", 2, 100)],
            vec![("silver", vec![reward("badge", None), reward("coupon", Some(7))])],
        ))
    }

    #[test]
    fn evaluation_picks_the_highest_crossed_level() {
        let levels = vec![level("bronze", 1, 0), level("silver", 2, 100), level("gold", 3, 500)];

        let target = evaluate_level_up(&levels, 600, Some(1)).unwrap();
        assert_eq!(target.id, "gold");

        assert!(evaluate_level_up(&levels, 50, Some(1)).is_none());
        // Forward-only: nothing below or at the current order qualifies.
        assert!(evaluate_level_up(&levels, 600, Some(3)).is_none());
    }

    #[tokio::test]
    async fn first_fetch_initializes_progress_at_the_lowest_level() {
        let store = two_level_store();
        let handler = GamificationRequestHandler::with_store(store.clone());

        let progress = handler.get_progress("user-1").await.unwrap();

        assert_eq!(progress.points, 0);
        assert_eq!(progress.current_level.unwrap().id, "bronze");
        assert!(store.user_rewards.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn crossing_a_threshold_levels_up_and_grants_rewards_exactly_once() {
        let store = two_level_store();
        let handler = GamificationRequestHandler::with_store(store.clone());

        handler.get_progress("user-1").await.unwrap();
        let points = handler.add_points("user-1", 150).await.unwrap();
        assert_eq!(points, 150);

        // Evaluate twice in a row; the second pass must not duplicate grants.
        let first = handler.get_progress("user-1").await.unwrap();
        let second = handler.get_progress("user-1").await.unwrap();

        assert_eq!(first.current_level.unwrap().id, "silver");
        assert_eq!(second.current_level.unwrap().id, "silver");

        let rewards = store.user_rewards.lock().unwrap();
        assert_eq!(rewards.len(), 2);
        assert!(rewards.iter().all(|r| r.status == REWARD_CLAIMABLE));
        assert!(rewards
            .iter()
            .all(|r| r.correlation_id == "levelup:user-1:silver"));
    }

    #[tokio::test]
    async fn add_points_rejects_non_positive_amounts() {
        let store = two_level_store();
        let handler = GamificationRequestHandler::with_store(store);

        assert!(matches!(
            handler.add_points("user-1", 0).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            handler.add_points("user-1", -5).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn claiming_a_claimable_reward_records_the_timestamp() {
        let store = two_level_store();
        let reward_id = store.push_reward("user-1", REWARD_CLAIMABLE, None);
        let handler = GamificationRequestHandler::with_store(store);

        let claimed = handler.claim_reward("user-1", &reward_id).await.unwrap();

        assert_eq!(claimed.status, REWARD_CLAIMED);
        assert!(claimed.claimed_at.is_some());
    }

    #[tokio::test]
    async fn claiming_past_expiry_expires_the_reward_and_fails() {
        let store = two_level_store();
        let expired_at = Utc::now().naive_utc() - Duration::days(1);
        let reward_id = store.push_reward("user-1", REWARD_CLAIMABLE, Some(expired_at));
        let handler = GamificationRequestHandler::with_store(store.clone());

        let result = handler.claim_reward("user-1", &reward_id).await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        let rewards = store.user_rewards.lock().unwrap();
        assert_eq!(rewards[0].status, REWARD_EXPIRED);
        assert!(rewards[0].claimed_at.is_none());
    }

    #[tokio::test]
    async fn terminal_rewards_cannot_be_claimed_again() {
        let store = two_level_store();
        let reward_id = store.push_reward("user-1", REWARD_CLAIMED, None);
        let handler = GamificationRequestHandler::with_store(store);

        let result = handler.claim_reward("user-1", &reward_id).await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn rewards_of_other_users_are_invisible() {
        let store = two_level_store();
        let reward_id = store.push_reward("user-1", REWARD_CLAIMABLE, None);
        let handler = GamificationRequestHandler::with_store(store);

        let result = handler.claim_reward("user-2", &reward_id).await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn a_late_claim_cannot_overwrite_a_terminal_state() {
        let store = two_level_store();
        let reward_id = store.push_reward("user-1", REWARD_CLAIMABLE, None);

        // A racing expiry wins between the service's read and its write.
        let expired = store.mark_expired(&reward_id).await.unwrap();
        assert!(expired.is_some());

        let late_claim = store
            .mark_claimed(&reward_id, Utc::now().naive_utc())
            .await
            .unwrap();
        assert!(late_claim.is_none());

        let rewards = store.user_rewards.lock().unwrap();
        assert_eq!(rewards[0].status, REWARD_EXPIRED);
        assert!(rewards[0].claimed_at.is_none());
    }

    #[tokio::test]
    async fn a_reward_without_expiry_never_auto_expires() {
        let store = two_level_store();
        let reward_id = store.push_reward("user-1", REWARD_CLAIMABLE, None);
        let handler = GamificationRequestHandler::with_store(store.clone());

        let claimed = handler.claim_reward("user-1", &reward_id).await;

        assert!(claimed.is_ok());
        assert_eq!(
            store.user_rewards.lock().unwrap()[0].status,
            REWARD_CLAIMED
        );
    }
}

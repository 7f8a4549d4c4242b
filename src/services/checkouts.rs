use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::checkouts::{Checkout, CheckoutVariant, NewVariant};
use crate::repositories::checkouts::{CheckoutStore, PgCheckoutRepository, VariantOutcome};

pub enum CheckoutRequest {
    FetchPublic {
        slug: String,
        response: oneshot::Sender<Result<PublicCheckout, ServiceError>>,
    },
    CreateVariant {
        user_id: String,
        checkout_id: String,
        variant: NewVariant,
        response: oneshot::Sender<Result<CheckoutVariant, ServiceError>>,
    },
}

#[derive(Serialize)]
pub struct PublicCheckout {
    pub checkout: Checkout,
    pub variants: Vec<CheckoutVariant>,
    pub selected_variant_id: Option<String>,
}

/// Weighted random pick over the variants' traffic shares: draw uniform in
/// `[0, total)` and take the first variant whose cumulative share exceeds
/// the draw. A checkout whose active variants all carry share 0 falls back
/// to a uniform pick.
pub fn select_variant<R: Rng>(variants: &[CheckoutVariant], rng: &mut R) -> Option<usize> {
    if variants.is_empty() {
        return None;
    }

    let total: i64 = variants.iter().map(|v| v.traffic_share as i64).sum();
    if total == 0 {
        return Some(rng.random_range(0..variants.len()));
    }

    let draw = rng.random_range(0..total);
    let mut cumulative = 0i64;
    for (index, variant) in variants.iter().enumerate() {
        cumulative += variant.traffic_share as i64;
        if draw < cumulative {
            return Some(index);
        }
    }

    // draw < total, so the walk always terminates inside the loop.
    Some(variants.len() - 1)
}

#[derive(Clone)]
pub struct CheckoutRequestHandler {
    repository: Arc<dyn CheckoutStore>,
}

impl CheckoutRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        CheckoutRequestHandler {
            repository: Arc::new(PgCheckoutRepository::new(sql_conn)),
        }
    }

    pub fn with_store(repository: Arc<dyn CheckoutStore>) -> Self {
        CheckoutRequestHandler { repository }
    }

    async fn fetch_public(&self, slug: &str) -> Result<PublicCheckout, ServiceError> {
        let checkout = self
            .repository
            .find_by_slug(slug)
            .await
            .map_err(|e| ServiceError::Repository("CheckoutService".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("checkout not found: {}", slug)))?;

        let variants = self
            .repository
            .active_variants(&checkout.id)
            .await
            .map_err(|e| ServiceError::Repository("CheckoutService".to_string(), e.to_string()))?;

        let selected = select_variant(&variants, &mut rand::rng());
        let selected_variant_id = match selected {
            Some(index) => {
                let id = variants[index].id.clone();
                self.repository.record_view(&id).await.map_err(|e| {
                    ServiceError::Repository("CheckoutService".to_string(), e.to_string())
                })?;
                Some(id)
            }
            None => None,
        };

        Ok(PublicCheckout {
            checkout,
            variants,
            selected_variant_id,
        })
    }

    async fn create_variant(
        &self,
        user_id: &str,
        checkout_id: &str,
        variant: NewVariant,
    ) -> Result<CheckoutVariant, ServiceError> {
        if variant.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "variant name must not be empty".to_string(),
            ));
        }
        if !(0..=100).contains(&variant.traffic_share) {
            return Err(ServiceError::Validation(format!(
                "traffic_share must be between 0 and 100, got {}",
                variant.traffic_share
            )));
        }

        let outcome = self
            .repository
            .create_variant(user_id, checkout_id, &variant)
            .await
            .map_err(|e| ServiceError::Repository("CheckoutService".to_string(), e.to_string()))?;

        match outcome {
            VariantOutcome::Created(created) => Ok(created),
            VariantOutcome::CheckoutNotFound => Err(ServiceError::NotFound(format!(
                "checkout not found: {}",
                checkout_id
            ))),
            VariantOutcome::ShareOverflow { existing_share_sum } => {
                Err(ServiceError::Validation(format!(
                    "traffic shares exceed 100: {} existing + {} requested",
                    existing_share_sum, variant.traffic_share
                )))
            }
        }
    }
}

#[async_trait]
impl RequestHandler<CheckoutRequest> for CheckoutRequestHandler {
    async fn handle_request(&self, request: CheckoutRequest) {
        match request {
            CheckoutRequest::FetchPublic { slug, response } => {
                let result = self.fetch_public(&slug).await;
                let _ = response.send(result);
            }
            CheckoutRequest::CreateVariant {
                user_id,
                checkout_id,
                variant,
                response,
            } => {
                let result = self.create_variant(&user_id, &checkout_id, variant).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct CheckoutService;

impl CheckoutService {
    pub fn new() -> Self {
        CheckoutService {}
    }
}

#[async_trait]
impl Service<CheckoutRequest, CheckoutRequestHandler> for CheckoutService {}

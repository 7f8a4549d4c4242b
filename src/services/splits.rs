use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::transactions::{NewSplit, TransactionSplit};
use crate::repositories::transactions::{PgTransactionRepository, SplitOutcome, TransactionStore};

pub enum SplitRequest {
    CreateSplit {
        user_id: String,
        split: NewSplit,
        response: oneshot::Sender<Result<TransactionSplit, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct SplitRequestHandler {
    repository: Arc<dyn TransactionStore>,
}

impl SplitRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        SplitRequestHandler {
            repository: Arc::new(PgTransactionRepository::new(sql_conn)),
        }
    }

    pub fn with_store(repository: Arc<dyn TransactionStore>) -> Self {
        SplitRequestHandler { repository }
    }

    async fn create_split(
        &self,
        user_id: &str,
        split: NewSplit,
    ) -> Result<TransactionSplit, ServiceError> {
        if split.amount_in_cents <= 0 {
            return Err(ServiceError::Validation(
                "amount_in_cents must be greater than zero".to_string(),
            ));
        }
        if !split.recipient_email.contains('@') {
            return Err(ServiceError::Validation(format!(
                "recipient_email is not a valid address: {}",
                split.recipient_email
            )));
        }

        let outcome = self
            .repository
            .create_split(user_id, &split)
            .await
            .map_err(|e| ServiceError::Repository("SplitService".to_string(), e.to_string()))?;

        match outcome {
            SplitOutcome::Created(created) => Ok(created),
            SplitOutcome::TransactionNotFound => Err(ServiceError::NotFound(format!(
                "transaction not found: {}",
                split.transaction_id
            ))),
            SplitOutcome::AmountOverflow {
                transaction_amount_in_cents,
                existing_splits_in_cents,
            } => Err(ServiceError::Validation(format!(
                "splits exceed transaction amount: {} existing + {} requested > {}",
                existing_splits_in_cents, split.amount_in_cents, transaction_amount_in_cents
            ))),
        }
    }
}

#[async_trait]
impl RequestHandler<SplitRequest> for SplitRequestHandler {
    async fn handle_request(&self, request: SplitRequest) {
        match request {
            SplitRequest::CreateSplit {
                user_id,
                split,
                response,
            } => {
                let result = self.create_split(&user_id, split).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct SplitService;

impl SplitService {
    pub fn new() -> Self {
        SplitService {}
    }
}

#[async_trait]
impl Service<SplitRequest, SplitRequestHandler> for SplitService {}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::transactions::{Transaction, DIRECTION_INCOMING, STATUS_PAID};

    struct MemoryTransactionStore {
        transactions: Vec<Transaction>,
        splits: Mutex<Vec<TransactionSplit>>,
    }

    impl MemoryTransactionStore {
        fn with_transaction(id: &str, user_id: &str, amount_in_cents: i64) -> Self {
            let now = Utc::now().naive_utc();
            MemoryTransactionStore {
                transactions: vec![Transaction {
                    id: id.to_string(),
                    user_id: user_id.to_string(),
                    amount_in_cents,
                    currency: "BRL".to_string(),
                    direction: DIRECTION_INCOMING.to_string(),
                    status: STATUS_PAID.to_string(),
                    method: "PIX".to_string(),
                    metadata: serde_json::json!({}),
                    created_at: now,
                    updated_at: now,
                }],
                splits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransactionStore for MemoryTransactionStore {
        async fn create_split(
            &self,
            user_id: &str,
            split: &NewSplit,
        ) -> Result<SplitOutcome, anyhow::Error> {
            let transaction = self
                .transactions
                .iter()
                .find(|t| t.id == split.transaction_id && t.user_id == user_id);
            let transaction = match transaction {
                Some(transaction) => transaction.clone(),
                None => return Ok(SplitOutcome::TransactionNotFound),
            };

            let mut splits = self.splits.lock().unwrap();
            let existing: i64 = splits
                .iter()
                .filter(|s| s.transaction_id == split.transaction_id)
                .map(|s| s.amount_in_cents)
                .sum();

            if existing + split.amount_in_cents > transaction.amount_in_cents {
                return Ok(SplitOutcome::AmountOverflow {
                    transaction_amount_in_cents: transaction.amount_in_cents,
                    existing_splits_in_cents: existing,
                });
            }

            let created = TransactionSplit {
                id: Uuid::new_v4().hyphenated().to_string(),
                transaction_id: split.transaction_id.clone(),
                recipient_email: split.recipient_email.clone(),
                amount_in_cents: split.amount_in_cents,
                status: "PENDING".to_string(),
                created_at: Utc::now().naive_utc(),
            };
            splits.push(created.clone());

            Ok(SplitOutcome::Created(created))
        }
    }

    fn new_split(transaction_id: &str, amount_in_cents: i64) -> NewSplit {
        NewSplit {
            transaction_id: transaction_id.to_string(),
            amount_in_cents,
            recipient_email: "partner@pixdesk.app".to_string(),
        }
    }

    #[tokio::test]
    async fn accepts_splits_up_to_the_exact_transaction_amount() {
        // 100.00 BRL transaction: 60.00 ok, 50.00 overflows, 40.00 lands
        // exactly on the limit and is accepted.
        let store = Arc::new(MemoryTransactionStore::with_transaction(
            "tx-1", "user-1", 10_000,
        ));
        let handler = SplitRequestHandler::with_store(store.clone());

        let first = handler.create_split("user-1", new_split("tx-1", 6_000)).await;
        assert!(first.is_ok());
        assert_eq!(first.unwrap().status, "PENDING");

        let overflow = handler.create_split("user-1", new_split("tx-1", 5_000)).await;
        assert!(matches!(overflow, Err(ServiceError::Validation(_))));
        // The rejected split is not persisted.
        assert_eq!(store.splits.lock().unwrap().len(), 1);

        let at_limit = handler.create_split("user-1", new_split("tx-1", 4_000)).await;
        assert!(at_limit.is_ok());
        assert_eq!(store.splits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_before_touching_the_store() {
        let store = Arc::new(MemoryTransactionStore::with_transaction(
            "tx-1", "user-1", 10_000,
        ));
        let handler = SplitRequestHandler::with_store(store.clone());

        let zero = handler.create_split("user-1", new_split("tx-1", 0)).await;
        assert!(matches!(zero, Err(ServiceError::Validation(_))));

        let negative = handler.create_split("user-1", new_split("tx-1", -100)).await;
        assert!(matches!(negative, Err(ServiceError::Validation(_))));

        assert!(store.splits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_transactions_owned_by_someone_else() {
        let store = Arc::new(MemoryTransactionStore::with_transaction(
            "tx-1", "user-1", 10_000,
        ));
        let handler = SplitRequestHandler::with_store(store);

        let result = handler.create_split("user-2", new_split("tx-1", 1_000)).await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_malformed_recipient_email() {
        let store = Arc::new(MemoryTransactionStore::with_transaction(
            "tx-1", "user-1", 10_000,
        ));
        let handler = SplitRequestHandler::with_store(store);

        let result = handler
            .create_split(
                "user-1",
                NewSplit {
                    transaction_id: "tx-1".to_string(),
                    amount_in_cents: 1_000,
                    recipient_email: "not-an-address".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }
}

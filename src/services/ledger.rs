use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::statements::{DayActivity, Statement};
use crate::repositories::ledger::{LedgerStore, PgLedgerRepository};

const MAX_PAGE_LIMIT: usize = 100;
const DEFAULT_PAGE_LIMIT: usize = 31;

pub enum LedgerRequest {
    GetStatements {
        user_id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: Option<usize>,
        limit: Option<usize>,
        response: oneshot::Sender<Result<StatementPage, ServiceError>>,
    },
}

#[derive(Serialize)]
pub struct StatementPage {
    pub statements: Vec<Statement>,
    pub current_balance_in_cents: i64,
    pub total_days: usize,
    pub page: usize,
    pub limit: usize,
}

/// Forward-filling recurrence over the calendar range. Every day in
/// `[start, end]` appears exactly once, in ascending order; days without
/// activity carry the running balance forward unchanged.
pub fn aggregate_days(
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    opening_balance_in_cents: i64,
    activity: &[DayActivity],
) -> Vec<Statement> {
    let by_day: HashMap<NaiveDate, &DayActivity> =
        activity.iter().map(|a| (a.day, a)).collect();

    let mut statements = Vec::new();
    let mut balance = opening_balance_in_cents;
    let mut day = start;

    while day <= end {
        let (entradas, saidas, count) = match by_day.get(&day) {
            Some(a) => (a.entradas_in_cents, a.saidas_in_cents, a.transaction_count),
            None => (0, 0, 0),
        };
        let variation = entradas - saidas;

        statements.push(Statement {
            user_id: user_id.to_string(),
            as_of_date: day,
            initial_balance_in_cents: balance,
            entradas_in_cents: entradas,
            saidas_in_cents: saidas,
            final_balance_in_cents: balance + variation,
            transaction_count: count,
            variation_in_cents: variation,
        });

        balance += variation;
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    statements
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    repository: Arc<dyn LedgerStore>,
}

impl LedgerRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        LedgerRequestHandler {
            repository: Arc::new(PgLedgerRepository::new(sql_conn)),
        }
    }

    pub fn with_store(repository: Arc<dyn LedgerStore>) -> Self {
        LedgerRequestHandler { repository }
    }

    async fn get_statements(
        &self,
        user_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<StatementPage, ServiceError> {
        if start_date > end_date {
            return Err(ServiceError::Validation(format!(
                "start_date {} is after end_date {}",
                start_date, end_date
            )));
        }

        let opening = self
            .repository
            .final_balance_before(user_id, start_date)
            .await
            .map_err(|e| ServiceError::Repository("LedgerService".to_string(), e.to_string()))?
            .unwrap_or(0);

        let activity = self
            .repository
            .daily_activity(user_id, start_date, end_date)
            .await
            .map_err(|e| ServiceError::Repository("LedgerService".to_string(), e.to_string()))?;

        let statements = aggregate_days(user_id, start_date, end_date, opening, &activity);

        self.repository
            .upsert_statements(&statements)
            .await
            .map_err(|e| ServiceError::Repository("LedgerService".to_string(), e.to_string()))?;

        // Current balance is the closing balance of the range, regardless
        // of which page the caller asked for.
        let current_balance_in_cents = statements
            .last()
            .map(|s| s.final_balance_in_cents)
            .unwrap_or(opening);

        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let total_days = statements.len();
        let statements = statements
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        Ok(StatementPage {
            statements,
            current_balance_in_cents,
            total_days,
            page,
            limit,
        })
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::GetStatements {
                user_id,
                start_date,
                end_date,
                page,
                limit,
                response,
            } => {
                let result = self
                    .get_statements(&user_id, start_date, end_date, page, limit)
                    .await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}

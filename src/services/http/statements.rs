use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{authenticate, channel_failure, error_response, parse_date, AppState};
use crate::services::ledger::LedgerRequest;

#[derive(Deserialize)]
pub struct StatementQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

pub async fn list_statements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatementQuery>,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let start_date = match parse_date(query.start_date.as_deref(), "start_date") {
        Ok(date) => date,
        Err(rejection) => return rejection,
    };
    let end_date = match parse_date(query.end_date.as_deref(), "end_date") {
        Ok(date) => date,
        Err(rejection) => return rejection,
    };

    let (ledger_tx, ledger_rx) = oneshot::channel();
    let send_result = state
        .ledger_channel
        .send(LedgerRequest::GetStatements {
            user_id,
            start_date,
            end_date,
            page: query.page,
            limit: query.limit,
            response: ledger_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("ledger", error);
    }

    match ledger_rx.await {
        Ok(Ok(page)) => (StatusCode::OK, Json(json!(page))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("ledger", error),
    }
}

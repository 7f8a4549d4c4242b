use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::checkouts::CheckoutRequest;
use super::gamification::GamificationRequest;
use super::ledger::LedgerRequest;
use super::splits::SplitRequest;
use super::ServiceError;
use crate::auth::CurrentUserResolver;

mod checkouts;
mod gamification;
mod splits;
mod statements;

#[derive(Clone)]
struct AppState {
    ledger_channel: mpsc::Sender<LedgerRequest>,
    split_channel: mpsc::Sender<SplitRequest>,
    checkout_channel: mpsc::Sender<CheckoutRequest>,
    gamification_channel: mpsc::Sender<GamificationRequest>,
    resolver: Arc<dyn CurrentUserResolver>,
}

/// Maps the service taxonomy onto HTTP statuses. Internal failures are
/// logged here and surfaced without detail.
fn error_response(error: ServiceError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            log::error!("Request failed: {}", error);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            );
        }
    };

    (status, Json(json!({"error": error.to_string()})))
}

fn channel_failure<E: std::fmt::Display>(context: &str, error: E) -> (StatusCode, Json<Value>) {
    error_response(ServiceError::Communication(
        context.to_string(),
        error.to_string(),
    ))
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<Value>)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => return Err(error_response(ServiceError::Unauthorized)),
    };

    match state.resolver.resolve(token).await {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err(error_response(ServiceError::Unauthorized)),
        Err(error) => Err(error_response(ServiceError::Internal(format!(
            "session lookup failed: {}",
            error
        )))),
    }
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, (StatusCode, Json<Value>)> {
    let raw = value.ok_or_else(|| {
        error_response(ServiceError::Validation(format!("{} is required", field)))
    })?;

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        error_response(ServiceError::Validation(format!(
            "{} is not an ISO-8601 date: {}",
            field, raw
        )))
    })
}

pub async fn start_http_server(
    bind_addr: &str,
    ledger_channel: mpsc::Sender<LedgerRequest>,
    split_channel: mpsc::Sender<SplitRequest>,
    checkout_channel: mpsc::Sender<CheckoutRequest>,
    gamification_channel: mpsc::Sender<GamificationRequest>,
    resolver: impl CurrentUserResolver + 'static,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        ledger_channel,
        split_channel,
        checkout_channel,
        gamification_channel,
        resolver: Arc::new(resolver),
    };

    let app = Router::new()
        .route("/statements", get(statements::list_statements))
        .route("/splits", post(splits::create_split))
        .route("/checkouts/{slug}", get(checkouts::fetch_public_checkout))
        .route("/variants", post(checkouts::create_variant))
        .route("/gamification/progress", get(gamification::get_progress))
        .route("/gamification/points", post(gamification::add_points))
        .route(
            "/gamification/rewards/{reward_id}/claim",
            post(gamification::claim_reward),
        )
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

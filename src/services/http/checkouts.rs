use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{authenticate, channel_failure, error_response, AppState};
use crate::models::checkouts::NewVariant;
use crate::services::checkouts::CheckoutRequest;

#[derive(Deserialize)]
pub struct CreateVariantBody {
    checkout_id: String,
    name: String,
    traffic_share: i32,
}

/// Public endpoint: no session required. Fetching the checkout selects one
/// variant and records its view.
pub async fn fetch_public_checkout(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    let (checkout_tx, checkout_rx) = oneshot::channel();
    let send_result = state
        .checkout_channel
        .send(CheckoutRequest::FetchPublic {
            slug,
            response: checkout_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("checkout", error);
    }

    match checkout_rx.await {
        Ok(Ok(checkout)) => (StatusCode::OK, Json(json!(checkout))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("checkout", error),
    }
}

pub async fn create_variant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateVariantBody>,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let (checkout_tx, checkout_rx) = oneshot::channel();
    let send_result = state
        .checkout_channel
        .send(CheckoutRequest::CreateVariant {
            user_id,
            checkout_id: body.checkout_id,
            variant: NewVariant {
                name: body.name,
                traffic_share: body.traffic_share,
            },
            response: checkout_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("checkout", error);
    }

    match checkout_rx.await {
        Ok(Ok(created)) => (StatusCode::CREATED, Json(json!(created))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("checkout", error),
    }
}

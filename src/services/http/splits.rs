use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tokio::sync::oneshot;

use super::{authenticate, channel_failure, error_response, AppState};
use crate::models::transactions::NewSplit;
use crate::services::splits::SplitRequest;

pub async fn create_split(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(split): Json<NewSplit>,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let (split_tx, split_rx) = oneshot::channel();
    let send_result = state
        .split_channel
        .send(SplitRequest::CreateSplit {
            user_id,
            split,
            response: split_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("split", error);
    }

    match split_rx.await {
        Ok(Ok(created)) => (StatusCode::CREATED, Json(json!(created))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("split", error),
    }
}

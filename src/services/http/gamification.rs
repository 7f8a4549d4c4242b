use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{authenticate, channel_failure, error_response, AppState};
use crate::services::gamification::GamificationRequest;

#[derive(Deserialize)]
pub struct AddPointsBody {
    amount: i64,
}

/// Reading progress also evaluates level-ups and grants pending rewards.
pub async fn get_progress(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let (progress_tx, progress_rx) = oneshot::channel();
    let send_result = state
        .gamification_channel
        .send(GamificationRequest::GetProgress {
            user_id,
            response: progress_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("gamification", error);
    }

    match progress_rx.await {
        Ok(Ok(progress)) => (StatusCode::OK, Json(json!(progress))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("gamification", error),
    }
}

pub async fn add_points(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddPointsBody>,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let (points_tx, points_rx) = oneshot::channel();
    let send_result = state
        .gamification_channel
        .send(GamificationRequest::AddPoints {
            user_id,
            amount: body.amount,
            response: points_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("gamification", error);
    }

    match points_rx.await {
        Ok(Ok(points)) => (StatusCode::OK, Json(json!({"points": points}))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("gamification", error),
    }
}

pub async fn claim_reward(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(reward_id): Path<String>,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(rejection) => return rejection,
    };

    let (claim_tx, claim_rx) = oneshot::channel();
    let send_result = state
        .gamification_channel
        .send(GamificationRequest::ClaimReward {
            user_id,
            reward_id,
            response: claim_tx,
        })
        .await;

    if let Err(error) = send_result {
        return channel_failure("gamification", error);
    }

    match claim_rx.await {
        Ok(Ok(claimed)) => (StatusCode::OK, Json(json!(claimed))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(error) => channel_failure("gamification", error),
    }
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use bank::rewards::DEFAULT_SUBSCRIPTION_DAYS;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::CurrentUser, error::AppError, services::purchase_subscription, state::State as AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(current_handler).post(purchase_handler))
        .route("/auto-renew", put(auto_renew_handler))
        .route("/history", get(history_handler))
}

async fn current_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state.store.active_subscription(user.id, Utc::now()).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub payment_id: Option<String>,
    /// Days.
    pub duration: Option<i64>,
}

async fn purchase_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = purchase_subscription(
        state.store.as_ref(),
        user.id,
        payload.duration.unwrap_or(DEFAULT_SUBSCRIPTION_DAYS),
        payload.payment_id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRenewRequest {
    pub auto_renew: bool,
}

async fn auto_renew_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<AutoRenewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state
        .store
        .set_auto_renew(user.id, payload.auto_renew, Utc::now())
        .await?
        .ok_or(AppError::NotFound("Active subscription"))?;

    Ok(Json(subscription))
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.store.subscriptions_for_user(user.id).await?))
}

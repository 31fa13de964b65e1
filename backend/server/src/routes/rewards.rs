use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use bank::{models::RankingKind, ranking::previous_month};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::{Admin, CurrentUser},
    error::AppError,
    services::run_monthly_ranking,
    state::State as AppState,
    utils::referral_code,
};

const RANKING_HISTORY: i64 = 12;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coins", get(coins_handler))
        .route("/referrals", get(referrals_handler))
        .route("/referral-link", get(referral_link_handler))
        .route("/calculate-monthly-ranking", post(ranking_handler))
        .route("/monthly-rankings", get(monthly_rankings_handler))
}

async fn coins_handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(json!({ "coins": user.coins, "referralCode": user.referral_code }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Referral {
    id: Uuid,
    first_name: String,
    last_name: String,
    phone: String,
    joined_at: DateTime<Utc>,
    has_active_subscription: bool,
}

async fn referrals_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut referrals = Vec::new();
    for referred in state.store.referrals_of(user.id).await? {
        let has_active_subscription = state
            .store
            .active_subscription(referred.id, now)
            .await?
            .is_some();
        referrals.push(Referral {
            id: referred.id,
            first_name: referred.first_name,
            last_name: referred.last_name,
            phone: referred.phone,
            joined_at: referred.created_at,
            has_active_subscription,
        });
    }

    Ok(Json(referrals))
}

async fn referral_link_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let code = match user.referral_code {
        Some(code) => code,
        None => {
            let code = referral_code();
            state.store.set_referral_code(user.id, &code).await?;
            code
        }
    };
    let link = state.link(&format!("/subscription?ref={code}"));

    Ok(Json(json!({ "referralCode": code, "referralLink": link })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingRequest {
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub kind: Option<RankingKind>,
}

async fn ranking_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    payload: Option<Json<RankingRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let (default_month, default_year) = previous_month(Utc::now());
    let month = request.month.unwrap_or(default_month);
    let year = request.year.unwrap_or(default_year);
    let kind = request.kind.unwrap_or_default();

    let outcome = run_monthly_ranking(state.store.as_ref(), month, year, kind).await?;

    Ok(Json(json!({
        "message": format!("Monthly ranking calculated for {month:02}/{year}"),
        "month": outcome.month,
        "year": outcome.year,
        "type": outcome.kind,
        "rankingsCount": outcome.rankings_count,
        "firstPlace": outcome.first_place,
    })))
}

async fn monthly_rankings_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .store
            .rankings_for_user(user.id, RANKING_HISTORY)
            .await?,
    ))
}

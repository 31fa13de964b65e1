//! Operations shared by the HTTP handlers and the jobs CLI.
use std::{collections::HashMap, sync::Arc};

use bank::{
    models::{RankingKind, Role, Subscription, User},
    ranking::{RankedResult, month_bounds, monthly_standings},
    rewards::{FIRST_PLACE_BONUS_COINS, MAX_SUBSCRIPTION_DAYS, pays_first_place_bonus},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    mail::verification_email,
    state::State,
    store::{NewSubscription, NewUser, Store},
    utils::{random_token, referral_code},
};

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub phone: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub school: Option<String>,
    pub region: Option<String>,
    pub referral_code: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hashes the password, links the referrer and stores the user. A
/// verification mail goes out in the background when an email is given.
pub async fn register_user(
    state: &Arc<State>,
    registration: Registration,
    role: Role,
) -> Result<User, AppError> {
    let phone = registration.phone.trim().to_string();
    if state.store.user_by_phone(&phone).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this phone already exists".to_string(),
        ));
    }

    let referred_by = match non_empty(registration.referral_code) {
        Some(code) => match state.store.user_by_referral_code(&code).await? {
            Some(referrer) => Some(referrer.id),
            None => return Err(AppError::BadRequest("Invalid referral code".to_string())),
        },
        None => None,
    };

    let email = non_empty(registration.email);
    let email_verification_token = email.as_ref().map(|_| random_token());

    let user = state
        .store
        .create_user(NewUser {
            phone,
            email: email.clone(),
            password_hash: state.passwords.hash(&registration.password)?,
            first_name: registration.first_name.trim().to_string(),
            last_name: registration.last_name.trim().to_string(),
            school: non_empty(registration.school),
            region: non_empty(registration.region),
            role,
            is_email_verified: false,
            email_verification_token: email_verification_token.clone(),
            referral_code: referral_code(),
            referred_by,
        })
        .await?;
    info!("Registered user {}", user.id);

    if let (Some(email), Some(token)) = (email, email_verification_token) {
        if state.mailer.is_some() {
            let state = state.clone();
            tokio::spawn(async move {
                let link = state.link(&format!("/verify-email/{token}"));
                if let Some(mailer) = &state.mailer {
                    mailer
                        .send_logged(&email, "Confirm your email", verification_email(&link))
                        .await;
                }
            });
        }
    }

    Ok(user)
}

pub fn check_duration(days: i64) -> Result<(), AppError> {
    if !(1..=MAX_SUBSCRIPTION_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "Duration must be between 1 and {MAX_SUBSCRIPTION_DAYS} days"
        )));
    }
    Ok(())
}

/// Starts a subscription of `days` days from now, replacing any active one.
pub async fn purchase_subscription(
    store: &dyn Store,
    user_id: Uuid,
    days: i64,
    payment_id: Option<String>,
) -> Result<Subscription, AppError> {
    check_duration(days)?;

    let start_date = Utc::now();
    let subscription = store
        .purchase_subscription(NewSubscription {
            user_id,
            start_date,
            end_date: start_date + Duration::days(days),
            payment_id,
        })
        .await?;
    info!("User {user_id} subscribed until {}", subscription.end_date);

    Ok(subscription)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstPlace {
    pub user_id: Uuid,
    pub avg_score: f64,
    pub bonus_awarded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingOutcome {
    pub month: u32,
    pub year: i32,
    #[serde(rename = "type")]
    pub kind: RankingKind,
    pub rankings_count: usize,
    pub first_place: Option<FirstPlace>,
}

/// Ranks a month of results and pays the country first place bonus. Safe to
/// rerun: rows are refreshed in place and the bonus is paid once per row.
pub async fn run_monthly_ranking(
    store: &dyn Store,
    month: u32,
    year: i32,
    kind: RankingKind,
) -> Result<RankingOutcome, AppError> {
    let (start, end) =
        month_bounds(month, year).ok_or_else(|| AppError::BadRequest("Invalid month".to_string()))?;
    let results = store.results_between(start, end).await?;

    let mut groups: HashMap<Uuid, Option<String>> = HashMap::new();
    if kind != RankingKind::Country {
        for result in &results {
            if groups.contains_key(&result.user_id) {
                continue;
            }
            let group = store.user_by_id(result.user_id).await?.and_then(|user| match kind {
                RankingKind::School => user.school,
                RankingKind::Region => user.region,
                RankingKind::Country => None,
            });
            groups.insert(result.user_id, group);
        }
    }

    let ranked: Vec<RankedResult> = results
        .iter()
        .map(|result| RankedResult {
            user_id: result.user_id,
            score: result.score,
            group: groups.get(&result.user_id).cloned().flatten(),
        })
        .collect();
    let standings = monthly_standings(&ranked, kind);
    let rankings = store
        .upsert_rankings(month as i32, year, kind, &standings)
        .await?;
    info!(
        "Ranked {} users for {month:02}/{year} ({kind:?})",
        rankings.len()
    );

    let mut first_place = None;
    if let Some(winner) = rankings.iter().find(|r| r.rank == 1) {
        let mut bonus_awarded = false;
        if pays_first_place_bonus(kind) {
            if store.award_bonus(winner.id, FIRST_PLACE_BONUS_COINS).await? {
                info!("Awarded {FIRST_PLACE_BONUS_COINS} coins to {}", winner.user_id);
            }
            bonus_awarded = true;
        }

        first_place = Some(FirstPlace {
            user_id: winner.user_id,
            avg_score: winner.avg_score,
            bonus_awarded,
        });
    }

    Ok(RankingOutcome {
        month,
        year,
        kind,
        rankings_count: rankings.len(),
        first_place,
    })
}

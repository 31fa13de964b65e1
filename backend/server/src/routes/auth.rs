use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use bank::{models::Role, rewards::DEFAULT_SUBSCRIPTION_DAYS};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use super::message;
use crate::{
    auth::CurrentUser,
    error::AppError,
    mail::reset_email,
    services::{Registration, check_duration, purchase_subscription, register_user},
    state::State as AppState,
    utils::{not_blank, random_token},
};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/register-with-payment", post(register_with_payment_handler))
        .route("/login", post(login_handler))
        .route("/me", get(me_handler))
        .route("/forgot-password", post(forgot_password_handler))
        .route("/reset-password", post(reset_password_handler))
        .route("/verify-email/{token}", get(verify_email_handler))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "not_blank", message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(custom(function = "not_blank", message = "First name is required"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank", message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
    pub school: Option<String>,
    pub region: Option<String>,
    pub referral_code: Option<String>,
}

impl From<RegisterRequest> for Registration {
    fn from(request: RegisterRequest) -> Self {
        Self {
            phone: request.phone,
            password: request.password,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            school: request.school,
            region: request.region,
            referral_code: request.referral_code,
        }
    }
}

impl RegisterRequest {
    /// An empty email from a form means no email.
    fn checked(mut self) -> Result<Self, AppError> {
        self.email = self.email.filter(|e| !e.trim().is_empty());
        self.validate()?;
        Ok(self)
    }
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.checked()?;

    let user = register_user(&state, payload.into(), Role::User).await?;
    let token = state.tokens.issue(user.id)?;

    Ok((StatusCode::CREATED, Json(json!({ "token": token, "user": user }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWithPaymentRequest {
    #[serde(flatten)]
    pub register: RegisterRequest,
    pub payment_id: Option<String>,
    pub duration: Option<i64>,
}

async fn register_with_payment_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterWithPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let register = payload.register.checked()?;
    let days = payload.duration.unwrap_or(DEFAULT_SUBSCRIPTION_DAYS);
    check_duration(days)?;

    let user = register_user(&state, register.into(), Role::User).await?;
    let subscription =
        purchase_subscription(state.store.as_ref(), user.id, days, payload.payment_id).await?;
    let token = state.tokens.issue(user.id)?;

    // Reload so the response shows the user as stored after the purchase.
    let user = state.store.user_by_id(user.id).await?.unwrap_or(user);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": user, "subscription": subscription })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user_by_phone(payload.phone.trim())
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !state.passwords.verify(&payload.password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn me_handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub phone: String,
}

async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user_by_phone(payload.phone.trim())
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let token = random_token();
    let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
    state.store.set_reset_token(user.id, &token, expires).await?;
    info!("Password reset requested for {}", user.id);

    if let (Some(email), Some(mailer)) = (user.email.as_deref(), state.mailer.as_ref()) {
        let link = state.link(&format!("/reset-password/{token}"));
        if mailer
            .send_logged(email, "Password reset", reset_email(&link))
            .await
        {
            return Ok(message("Password reset link sent to your email"));
        }
    }

    Ok(Json(json!({
        "message": "Password reset token generated",
        "token": token,
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = state
        .store
        .user_by_reset_token(&payload.token)
        .await?
        .filter(|u| u.reset_password_expires.is_some_and(|at| at > Utc::now()))
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

    let hash = state.passwords.hash(&payload.password)?;
    state.store.set_password(user.id, &hash).await?;
    info!("Password reset for {}", user.id);

    Ok(message("Password has been reset"))
}

async fn verify_email_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .verify_email(&token)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid verification token".to_string()))?;

    Ok(message("Email verified"))
}

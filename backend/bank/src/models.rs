//! # Records
//!
//! Row types shared by the server, the jobs CLI and the smoke client.
//!
//! Every record serializes camelCase, which is what the web client reads.
//! Secrets on [`User`] (password hash, verification and reset tokens) never
//! leave the process.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Repetitor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Repetitor => "repetitor",
            Role::Admin => "admin",
        }
    }

    /// Repetitors and admins may author subjects, tests and questions.
    pub fn can_manage_content(&self) -> bool {
        matches!(self, Role::Repetitor | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "repetitor" => Ok(Role::Repetitor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "degree_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Degree {
    #[default]
    Bachelor,
    Master,
    Phd,
}

/// Scope a monthly ranking is computed over.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ranking_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RankingKind {
    School,
    Region,
    #[default]
    Country,
}

impl FromStr for RankingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "school" => Ok(RankingKind::School),
            "region" => Ok(RankingKind::Region),
            "country" => Ok(RankingKind::Country),
            other => Err(format!("unknown ranking type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    pub email: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub school: Option<String>,
    pub region: Option<String>,
    pub photo: Option<String>,
    pub role: Role,
    pub is_email_verified: bool,
    #[serde(skip)]
    pub email_verification_token: Option<String>,
    #[serde(skip)]
    pub reset_password_token: Option<String>,
    #[serde(skip)]
    pub reset_password_expires: Option<DateTime<Utc>>,
    pub coins: i32,
    pub referral_code: Option<String>,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creator shown next to tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Public card used on leaderboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub school: Option<String>,
    pub region: Option<String>,
    pub photo: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            school: user.school.clone(),
            region: user.region.clone(),
            photo: user.photo.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_free: bool,
    /// Minutes.
    pub time_limit: Option<i32>,
    pub max_score: i32,
    pub created_by: Uuid,
    pub is_active: bool,
    pub is_main_ort: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Json<Vec<QuestionOption>>,
    pub correct_answer: i32,
    pub explanation: Option<String>,
    pub points: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question as served to a test taker: no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: Uuid,
    pub test_id: Uuid,
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Vec<String>,
    pub points: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            test_id: question.test_id,
            question_text: question.question_text.clone(),
            question_image: question.question_image.clone(),
            options: question.options.iter().map(|o| o.text.clone()).collect(),
            points: question.points,
        }
    }
}

/// One graded line of an attempt, stored denormalized on the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDetail {
    pub question_id: Uuid,
    pub question_text: String,
    pub selected_answer: i32,
    pub correct_answer: i32,
    pub is_correct: bool,
    pub explanation: Option<String>,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub test_id: Uuid,
    pub score: i32,
    pub max_score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    /// Seconds.
    pub time_spent: Option<i32>,
    pub answers: Json<Vec<AnswerDetail>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renew: bool,
    pub payment_id: Option<String>,
    pub discount_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct University {
    pub id: Uuid,
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Specialty {
    pub id: Uuid,
    pub university_id: Uuid,
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub average_score: f64,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    /// Years of study.
    pub duration: Option<i32>,
    pub degree: Degree,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRanking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub rank: i32,
    pub avg_score: f64,
    pub total_tests: i32,
    #[serde(rename = "type")]
    pub kind: RankingKind,
    pub bonus_awarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

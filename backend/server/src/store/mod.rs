//! # Store
//!
//! Everything the handlers persist goes through [`Store`].
//!
//! - [`PgStore`]: PostgreSQL through a `sqlx` pool, used when serving
//! - [`MemoryStore`]: `tokio` locked tables, used by tests and local demos
//!
//! Both implementations keep the same guarantees:
//! - phone numbers and referral codes are unique ([`StoreError::Conflict`])
//! - buying a subscription expires the previous active rows, inserts the new
//!   one and pays any referral reward as one unit
//! - the monthly first place bonus is paid at most once per ranking row
//! - test results are never removed: a test that has results is deactivated
//!   instead of deleted, and a subject with results cannot be deleted
//! - deleting a subject, test or university otherwise removes its children
use async_trait::async_trait;
use bank::{
    models::{
        AnswerDetail, Degree, MonthlyRanking, Question, QuestionOption, RankingKind, Role,
        Specialty, Subject, Subscription, Test, TestResult, University, User,
    },
    ranking::Standing,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const SUBJECT_HAS_RESULTS: &str = "Subject has test results and cannot be deleted";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub school: Option<String>,
    pub region: Option<String>,
    pub role: Role,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[validate(length(min = 1, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, message = "Last name cannot be empty"))]
    pub last_name: Option<String>,
    pub school: Option<String>,
    pub region: Option<String>,
    pub photo: Option<String>,
}

/// Narrows the users considered for a leaderboard.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub school: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTest {
    pub subject_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_free: bool,
    pub time_limit: Option<i32>,
    pub max_score: i32,
    pub is_main_ort: bool,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TestPatch {
    pub subject_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_free: Option<bool>,
    #[validate(range(min = 1, message = "Time limit must be positive"))]
    pub time_limit: Option<i32>,
    #[validate(range(min = 1, message = "Max score must be positive"))]
    pub max_score: Option<i32>,
    pub is_active: Option<bool>,
    pub is_main_ort: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    pub subject_id: Option<Uuid>,
    pub free_only: bool,
    pub active_only: bool,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub test_id: Uuid,
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Vec<QuestionOption>,
    pub correct_answer: i32,
    pub explanation: Option<String>,
    pub points: i32,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionPatch {
    pub question_text: Option<String>,
    pub question_image: Option<String>,
    pub options: Option<Vec<QuestionOption>>,
    pub correct_answer: Option<i32>,
    pub explanation: Option<String>,
    pub points: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub user_id: Uuid,
    pub test_id: Uuid,
    pub score: i32,
    pub max_score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub time_spent: Option<i32>,
    pub answers: Vec<AnswerDetail>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UniversityFields {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UniversityPatch {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SpecialtyFields {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 300.0, message = "Average score must be between 0 and 300"))]
    pub average_score: f64,
    #[validate(range(min = 0.0, max = 300.0, message = "Min score must be between 0 and 300"))]
    pub min_score: Option<f64>,
    #[validate(range(min = 0.0, max = 300.0, message = "Max score must be between 0 and 300"))]
    pub max_score: Option<f64>,
    #[validate(range(min = 1, message = "Duration must be positive"))]
    pub duration: Option<i32>,
    #[serde(default)]
    pub degree: Degree,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SpecialtyPatch {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub name_kg: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 300.0, message = "Average score must be between 0 and 300"))]
    pub average_score: Option<f64>,
    #[validate(range(min = 0.0, max = 300.0, message = "Min score must be between 0 and 300"))]
    pub min_score: Option<f64>,
    #[validate(range(min = 0.0, max = 300.0, message = "Max score must be between 0 and 300"))]
    pub max_score: Option<f64>,
    #[validate(range(min = 1, message = "Duration must be positive"))]
    pub duration: Option<i32>,
    pub degree: Option<Degree>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformCounts {
    pub users: i64,
    pub tests: i64,
    pub results: i64,
    pub active_subscriptions: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn migrate(&self) -> StoreResult<()> {
        Ok(())
    }

    // users
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>>;
    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>>;
    async fn user_by_reset_token(&self, token: &str) -> StoreResult<Option<User>>;
    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>>;
    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>>;
    /// Sets a new password hash and clears any pending reset token.
    async fn set_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Marks the owner of `token` verified and consumes the token.
    async fn verify_email(&self, token: &str) -> StoreResult<Option<User>>;
    async fn set_referral_code(&self, id: Uuid, code: &str) -> StoreResult<()>;
    /// Page of users, newest first, with the total count.
    async fn list_users(&self, offset: i64, limit: i64) -> StoreResult<(Vec<User>, i64)>;
    async fn users_matching(&self, filter: UserFilter) -> StoreResult<Vec<User>>;
    /// Users referred by `referrer`, newest first.
    async fn referrals_of(&self, referrer: Uuid) -> StoreResult<Vec<User>>;
    /// Sorted distinct non-empty schools and regions.
    async fn schools_and_regions(&self) -> StoreResult<(Vec<String>, Vec<String>)>;

    // subjects
    async fn create_subject(&self, subject: NewSubject) -> StoreResult<Subject>;
    async fn list_subjects(&self) -> StoreResult<Vec<Subject>>;
    async fn subject_by_id(&self, id: Uuid) -> StoreResult<Option<Subject>>;
    /// Fails with [`StoreError::Conflict`] when any of its tests has results.
    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool>;

    // tests
    async fn create_test(&self, test: NewTest) -> StoreResult<Test>;
    async fn test_by_id(&self, id: Uuid) -> StoreResult<Option<Test>>;
    /// Newest first.
    async fn list_tests(&self, filter: TestFilter) -> StoreResult<Vec<Test>>;
    async fn tests_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Test>>;
    async fn update_test(&self, id: Uuid, patch: TestPatch) -> StoreResult<Option<Test>>;
    /// Deactivates a test that has results, removes it otherwise.
    async fn delete_test(&self, id: Uuid) -> StoreResult<bool>;
    /// Inserts a test with all of its questions, or nothing. The `test_id` of
    /// each question is replaced with the new test's id.
    async fn import_test(
        &self,
        test: NewTest,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<(Test, Vec<Question>)>;
    /// The newest active test flagged as the main ORT exam.
    async fn main_ort_test(&self) -> StoreResult<Option<Test>>;

    // questions
    async fn create_question(&self, question: NewQuestion) -> StoreResult<Question>;
    /// In creation order.
    async fn questions_for_test(&self, test_id: Uuid) -> StoreResult<Vec<Question>>;
    async fn question_by_id(&self, id: Uuid) -> StoreResult<Option<Question>>;
    async fn update_question(&self, id: Uuid, patch: QuestionPatch)
    -> StoreResult<Option<Question>>;
    async fn delete_question(&self, id: Uuid) -> StoreResult<bool>;

    // results
    async fn create_result(&self, result: NewResult) -> StoreResult<TestResult>;
    /// Page of a user's results, newest first, with the total count.
    async fn results_page(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<TestResult>, i64)>;
    async fn results_for_user(&self, user_id: Uuid) -> StoreResult<Vec<TestResult>>;
    async fn results_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<TestResult>>;
    async fn latest_result(&self, user_id: Uuid, test_id: Uuid) -> StoreResult<Option<TestResult>>;
    /// Results completed in `[start, end)`.
    async fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<TestResult>>;

    // subscriptions
    /// The active, unexpired subscription ending last.
    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>>;
    /// Newest first.
    async fn subscriptions_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Subscription>>;
    /// Expires every active row of the user and inserts the new one. On the
    /// first purchase of a referred user the referral discount is recorded
    /// and the referrer credited, all in the same unit.
    async fn purchase_subscription(&self, purchase: NewSubscription) -> StoreResult<Subscription>;
    async fn set_auto_renew(
        &self,
        user_id: Uuid,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>>;

    // universities
    /// Ordered by name.
    async fn list_universities(&self, active_only: bool) -> StoreResult<Vec<University>>;
    async fn university_by_id(&self, id: Uuid) -> StoreResult<Option<University>>;
    async fn create_university(
        &self,
        fields: UniversityFields,
        created_by: Uuid,
    ) -> StoreResult<University>;
    async fn update_university(
        &self,
        id: Uuid,
        patch: UniversityPatch,
    ) -> StoreResult<Option<University>>;
    async fn delete_university(&self, id: Uuid) -> StoreResult<bool>;

    // specialties
    /// Ordered by average score, lowest first.
    async fn specialties_for(
        &self,
        university_id: Uuid,
        active_only: bool,
    ) -> StoreResult<Vec<Specialty>>;
    async fn specialty_by_id(&self, id: Uuid) -> StoreResult<Option<Specialty>>;
    async fn create_specialty(
        &self,
        university_id: Uuid,
        fields: SpecialtyFields,
        created_by: Uuid,
    ) -> StoreResult<Specialty>;
    async fn update_specialty(
        &self,
        id: Uuid,
        patch: SpecialtyPatch,
    ) -> StoreResult<Option<Specialty>>;
    async fn delete_specialty(&self, id: Uuid) -> StoreResult<bool>;

    // rankings
    /// Inserts or refreshes one row per standing for the period.
    async fn upsert_rankings(
        &self,
        month: i32,
        year: i32,
        kind: RankingKind,
        standings: &[Standing],
    ) -> StoreResult<Vec<MonthlyRanking>>;
    /// Credits `coins` to the owner of the ranking row and flags it, unless it
    /// was already flagged. Returns whether coins were paid.
    async fn award_bonus(&self, ranking_id: Uuid, coins: i32) -> StoreResult<bool>;
    /// Newest period first.
    async fn rankings_for_user(&self, user_id: Uuid, limit: i64)
    -> StoreResult<Vec<MonthlyRanking>>;

    async fn platform_counts(&self, now: DateTime<Utc>) -> StoreResult<PlatformCounts>;
}

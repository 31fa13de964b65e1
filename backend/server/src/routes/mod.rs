use std::{collections::HashMap, sync::Arc};

use axum::{Json, Router, routing::get};
use bank::models::{Subject, Test, UserSummary};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{error::AppError, state::State};

pub mod admin;
pub mod auth;
pub mod rewards;
pub mod subscription;
pub mod tests;
pub mod universities;
pub mod users;

pub fn api() -> Router<Arc<State>> {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/auth", auth::router())
        .nest("/tests", tests::router())
        .nest("/users", users::router())
        .nest("/admin", admin::router())
        .nest("/subscription", subscription::router())
        .nest("/universities", universities::router())
        .nest("/rewards", rewards::router())
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "ORT Platform API is running" }))
}

/// A test with its subject and creator embedded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestView {
    #[serde(flatten)]
    pub test: Test,
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserSummary>,
}

/// Resolves subjects and creators for many tests with one lookup each.
pub async fn describe_tests(
    state: &State,
    tests: Vec<Test>,
    with_creator: bool,
) -> Result<Vec<TestView>, AppError> {
    let subjects: HashMap<Uuid, Subject> = state
        .store
        .list_subjects()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut creators: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
    if with_creator {
        for test in &tests {
            if !creators.contains_key(&test.created_by) {
                let creator = state.store.user_by_id(test.created_by).await?;
                creators.insert(test.created_by, creator.as_ref().map(UserSummary::from));
            }
        }
    }

    Ok(tests
        .into_iter()
        .map(|test| TestView {
            subject: subjects.get(&test.subject_id).cloned(),
            creator: creators.get(&test.created_by).cloned().flatten(),
            test,
        })
        .collect())
}

pub async fn describe_test(state: &State, test: Test) -> Result<TestView, AppError> {
    let subject = state.store.subject_by_id(test.subject_id).await?;
    let creator = state.store.user_by_id(test.created_by).await?;

    Ok(TestView {
        subject,
        creator: creator.as_ref().map(UserSummary::from),
        test,
    })
}

pub fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

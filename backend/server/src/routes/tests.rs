use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use bank::{
    models::{PublicQuestion, Subject, Test, User},
    scoring::{SubmittedAnswer, grade},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{describe_test, describe_tests};
use crate::{
    auth::Caller,
    error::AppError,
    state::State as AppState,
    store::{NewResult, TestFilter},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler))
        .route("/subjects", get(subjects_handler))
        .route("/free-by-subject", get(free_by_subject_handler))
        .route("/{id}", get(test_handler))
        .route("/{id}/questions", get(questions_handler))
        .route("/{id}/submit", post(submit_handler))
}

#[derive(Debug, Serialize)]
struct SubjectWithTests {
    #[serde(flatten)]
    subject: Subject,
    tests: Vec<Test>,
}

async fn subjects_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let subjects = state.store.list_subjects().await?;
    let tests = state
        .store
        .list_tests(TestFilter {
            active_only: true,
            ..Default::default()
        })
        .await?;

    let mut by_subject: HashMap<Uuid, Vec<Test>> = HashMap::new();
    for test in tests {
        by_subject.entry(test.subject_id).or_default().push(test);
    }

    let subjects: Vec<SubjectWithTests> = subjects
        .into_iter()
        .map(|subject| SubjectWithTests {
            tests: by_subject.remove(&subject.id).unwrap_or_default(),
            subject,
        })
        .collect();

    Ok(Json(subjects))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub subject_id: Option<Uuid>,
    pub free_only: Option<String>,
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let tests = state
        .store
        .list_tests(TestFilter {
            subject_id: query.subject_id,
            free_only: query.free_only.as_deref() == Some("true"),
            active_only: true,
        })
        .await?;

    Ok(Json(describe_tests(&state, tests, true).await?))
}

#[derive(Debug, Serialize)]
struct FreeTest {
    subject: Subject,
    test: Test,
}

async fn free_by_subject_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let subjects: HashMap<Uuid, Subject> = state
        .store
        .list_subjects()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let tests = state
        .store
        .list_tests(TestFilter {
            free_only: true,
            active_only: true,
            ..Default::default()
        })
        .await?;

    // Tests arrive newest first, so the first one per subject wins.
    let mut free: HashMap<Uuid, FreeTest> = HashMap::new();
    for test in tests {
        if free.contains_key(&test.subject_id) {
            continue;
        }
        if let Some(subject) = subjects.get(&test.subject_id) {
            free.insert(
                test.subject_id,
                FreeTest {
                    subject: subject.clone(),
                    test,
                },
            );
        }
    }

    Ok(Json(free))
}

async fn load_test(state: &AppState, id: Uuid) -> Result<Test, AppError> {
    state
        .store
        .test_by_id(id)
        .await?
        .filter(|test| test.is_active)
        .ok_or(AppError::NotFound("Test"))
}

async fn test_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let test = load_test(&state, id).await?;
    Ok(Json(describe_test(&state, test).await?))
}

/// Free tests are open to anyone. Paid tests need a login and an active
/// subscription. Returns the caller when one is known.
async fn admit(state: &AppState, test: &Test, caller: Caller) -> Result<Option<User>, AppError> {
    if test.is_free {
        return Ok(caller.user());
    }

    let user = caller.require()?;
    if state
        .store
        .active_subscription(user.id, Utc::now())
        .await?
        .is_none()
    {
        return Err(AppError::Forbidden("Subscription required".to_string()));
    }

    Ok(Some(user))
}

async fn questions_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let test = load_test(&state, id).await?;
    admit(&state, &test, caller).await?;

    let questions: Vec<PublicQuestion> = state
        .store
        .questions_for_test(test.id)
        .await?
        .iter()
        .map(PublicQuestion::from)
        .collect();

    Ok(Json(json!({
        "questions": questions,
        "test": {
            "id": test.id,
            "title": test.title,
            "timeLimit": test.time_limit,
            "maxScore": test.max_score,
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    pub time_spent: Option<i32>,
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let test = load_test(&state, id).await?;
    let user = admit(&state, &test, caller).await?;

    let questions = state.store.questions_for_test(test.id).await?;
    let graded = grade(&questions, &payload.answers)
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    let time_spent = payload.time_spent.map(|t| t.max(0));

    let result = match &user {
        Some(user) => {
            let completed_at = Utc::now();
            let result = state
                .store
                .create_result(NewResult {
                    user_id: user.id,
                    test_id: test.id,
                    score: graded.score,
                    max_score: test.max_score,
                    correct_answers: graded.correct_answers,
                    total_questions: graded.total_questions,
                    time_spent,
                    answers: graded.answers.clone(),
                    started_at: completed_at - Duration::seconds(time_spent.unwrap_or(0) as i64),
                    completed_at,
                })
                .await?;
            info!("Saved result {} for user {}", result.id, user.id);
            Some(result)
        }
        None => None,
    };

    Ok(Json(json!({
        "result": result,
        "detailedAnswers": graded.answers,
        "score": graded.score,
        "maxScore": test.max_score,
        "correctAnswers": graded.correct_answers,
        "totalQuestions": graded.total_questions,
        "saved": user.is_some(),
    })))
}

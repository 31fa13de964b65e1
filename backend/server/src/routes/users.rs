use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use bank::{
    models::{PublicUser, RankingKind, TestResult, User},
    ranking::{average_by_user, position_among},
    scoring::rebuild,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{TestView, describe_tests};
use crate::{
    auth::CurrentUser,
    error::AppError,
    state::State as AppState,
    store::{ProfilePatch, TestFilter, UserFilter},
    utils::PageQuery,
};

const LEADERBOARD_SIZE: usize = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile_handler).put(update_profile_handler))
        .route("/history", get(history_handler))
        .route("/test-result/{test_id}", get(test_result_handler))
        .route("/statistics", get(statistics_handler))
        .route("/ranking", get(ranking_handler))
        .route("/ranking/filters", get(ranking_filters_handler))
}

async fn profile_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state.store.active_subscription(user.id, Utc::now()).await?;

    let mut profile = serde_json::to_value(&user).map_err(anyhow::Error::from)?;
    profile["subscription"] = serde_json::to_value(subscription).map_err(anyhow::Error::from)?;

    Ok(Json(profile))
}

async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<impl IntoResponse, AppError> {
    patch.validate()?;

    let user = state
        .store
        .update_profile(user.id, patch)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(user))
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    #[serde(flatten)]
    result: TestResult,
    test: Option<TestView>,
}

/// Pairs results with their tests, keeping result order.
async fn with_tests(
    state: &AppState,
    results: Vec<TestResult>,
) -> Result<Vec<HistoryEntry>, AppError> {
    let ids: Vec<Uuid> = results
        .iter()
        .map(|r| r.test_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let tests = state.store.tests_by_ids(&ids).await?;
    let views: HashMap<Uuid, TestView> = describe_tests(state, tests, false)
        .await?
        .into_iter()
        .map(|view| (view.test.id, view))
        .collect();

    Ok(results
        .into_iter()
        .map(|result| HistoryEntry {
            test: views.get(&result.test_id).cloned(),
            result,
        })
        .collect())
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.resolve();
    let (results, total) = state
        .store
        .results_page(user.id, page.offset(), page.limit)
        .await?;

    Ok(Json(json!({
        "results": with_tests(&state, results).await?,
        "total": total,
        "page": page.page,
        "pages": page.pages(total),
    })))
}

async fn test_result_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .store
        .latest_result(user.id, test_id)
        .await?
        .ok_or(AppError::NotFound("Test result"))?;
    let questions = state.store.questions_for_test(test_id).await?;
    let detailed = rebuild(&questions, &result.answers);

    Ok(Json(json!({
        "result": result,
        "detailedAnswers": detailed,
        "score": result.score,
        "maxScore": result.max_score,
        "correctAnswers": result.correct_answers,
        "totalQuestions": result.total_questions,
        "timeSpent": result.time_spent,
        "saved": true,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectStat {
    subject_id: Uuid,
    subject_name: String,
    avg_score: f64,
    attempts: i32,
}

fn mean(values: impl Iterator<Item = i32>) -> f64 {
    let (sum, count) = values.fold((0i64, 0i64), |(sum, count), v| (sum + v as i64, count + 1));
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let results = state.store.results_for_user(user.id).await?;
    let average_score = mean(results.iter().map(|r| r.score));
    let average_max_score = mean(results.iter().map(|r| r.max_score));

    let entries = with_tests(&state, results).await?;
    let mut by_subject: HashMap<Uuid, (String, Vec<i32>)> = HashMap::new();
    for entry in &entries {
        let Some(subject) = entry.test.as_ref().and_then(|t| t.subject.as_ref()) else {
            continue;
        };
        by_subject
            .entry(subject.id)
            .or_insert_with(|| (subject.name.clone(), Vec::new()))
            .1
            .push(entry.result.score);
    }

    let mut subject_stats: Vec<SubjectStat> = by_subject
        .into_iter()
        .map(|(subject_id, (subject_name, scores))| SubjectStat {
            subject_id,
            subject_name,
            avg_score: mean(scores.iter().copied()),
            attempts: scores.len() as i32,
        })
        .collect();
    subject_stats.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));

    let school_rank = match user.school.as_deref().filter(|s| !s.is_empty()) {
        Some(school) => {
            let classmates = state
                .store
                .users_matching(UserFilter {
                    school: Some(school.to_string()),
                    region: None,
                })
                .await?;
            let ids: Vec<Uuid> = classmates.iter().map(|u| u.id).collect();
            let results = state.store.results_for_users(&ids).await?;
            let averages = average_by_user(results.iter().map(|r| (r.user_id, r.score)));
            Some(position_among(average_score, &averages))
        }
        None => None,
    };

    Ok(Json(json!({
        "totalTests": entries.len(),
        "averageScore": average_score,
        "averageMaxScore": average_max_score,
        "subjectStats": subject_stats,
        "schoolRank": school_rank,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingQuery {
    #[serde(rename = "type")]
    pub kind: Option<RankingKind>,
    pub subject_id: Option<Uuid>,
    pub school: Option<String>,
    pub region: Option<String>,
}

fn given(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Users a leaderboard is computed over. `school` and `region` boards fall
/// back to the caller's own school or region.
fn leaderboard_filter(query: &RankingQuery, caller: &User) -> UserFilter {
    let school = given(&query.school);
    let region = given(&query.region);

    match query.kind.unwrap_or(RankingKind::School) {
        RankingKind::School => UserFilter {
            school: school.or_else(|| given(&caller.school)),
            region,
        },
        RankingKind::Region => UserFilter {
            school,
            region: region.or_else(|| given(&caller.region)),
        },
        RankingKind::Country => UserFilter { school, region },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardRow {
    user_id: Uuid,
    avg_score: f64,
    total_tests: i32,
    user: Option<PublicUser>,
}

async fn ranking_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    Query(query): Query<RankingQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = state
        .store
        .users_matching(leaderboard_filter(&query, &caller))
        .await?;
    if users.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let mut results = state.store.results_for_users(&ids).await?;

    if let Some(subject_id) = query.subject_id {
        let subject_tests: HashSet<Uuid> = state
            .store
            .list_tests(TestFilter {
                subject_id: Some(subject_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        results.retain(|r| subject_tests.contains(&r.test_id));
    }

    let cards: HashMap<Uuid, PublicUser> = users.iter().map(|u| (u.id, u.into())).collect();
    let rows: Vec<LeaderboardRow> = average_by_user(results.iter().map(|r| (r.user_id, r.score)))
        .into_iter()
        .take(LEADERBOARD_SIZE)
        .map(|average| LeaderboardRow {
            user: cards.get(&average.user_id).cloned(),
            user_id: average.user_id,
            avg_score: average.avg_score,
            total_tests: average.total_tests,
        })
        .collect();

    Ok(Json(rows))
}

async fn ranking_filters_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let (schools, regions) = state.store.schools_and_regions().await?;
    Ok(Json(json!({ "schools": schools, "regions": regions })))
}

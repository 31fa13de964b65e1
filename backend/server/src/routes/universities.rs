use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use bank::{
    admission::{Status, admission_chance},
    models::{Specialty, University},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{auth::Caller, error::AppError, state::State as AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler))
        .route("/{id}", get(university_handler))
        .route("/{id}/specialties/{specialty_id}", get(specialty_handler))
}

#[derive(Debug, Serialize)]
struct UniversityWithSpecialties {
    #[serde(flatten)]
    university: University,
    specialties: Vec<Specialty>,
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let universities = state.store.list_universities(true).await?;

    let mut listed = Vec::with_capacity(universities.len());
    for university in universities {
        listed.push(UniversityWithSpecialties {
            specialties: state.store.specialties_for(university.id, true).await?,
            university,
        });
    }

    Ok(Json(listed))
}

async fn active_university(state: &AppState, id: Uuid) -> Result<University, AppError> {
    state
        .store
        .university_by_id(id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::NotFound("University"))
}

/// The score admission chances are computed from: the caller's latest result
/// on the main ORT test. Needs a login and an active subscription.
async fn ort_score(state: &AppState, caller: Caller) -> Result<Option<f64>, AppError> {
    let Some(user) = caller.user() else {
        return Ok(None);
    };
    if state
        .store
        .active_subscription(user.id, Utc::now())
        .await?
        .is_none()
    {
        return Ok(None);
    }
    let Some(test) = state.store.main_ort_test().await? else {
        return Ok(None);
    };

    Ok(state
        .store
        .latest_result(user.id, test.id)
        .await?
        .map(|result| result.score as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionChance {
    specialty_id: Uuid,
    specialty_name: String,
    user_score: f64,
    required_score: f64,
    min_score: Option<f64>,
    chance: u8,
    status: Status,
}

fn chance_for(specialty: &Specialty, user_score: f64) -> AdmissionChance {
    let estimate = admission_chance(user_score, specialty.average_score, specialty.min_score);

    AdmissionChance {
        specialty_id: specialty.id,
        specialty_name: specialty.name.clone(),
        user_score,
        required_score: specialty.average_score,
        min_score: specialty.min_score,
        chance: estimate.chance,
        status: estimate.status,
    }
}

async fn university_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let university = active_university(&state, id).await?;
    let specialties = state.store.specialties_for(university.id, true).await?;

    let admission_chances = ort_score(&state, caller).await?.map(|score| {
        specialties
            .iter()
            .map(|s| chance_for(s, score))
            .collect::<Vec<_>>()
    });

    let mut body = serde_json::to_value(UniversityWithSpecialties {
        university,
        specialties,
    })
    .map_err(anyhow::Error::from)?;
    body["admissionChances"] = json!(admission_chances);

    Ok(Json(body))
}

async fn specialty_handler(
    State(state): State<Arc<AppState>>,
    Path((id, specialty_id)): Path<(Uuid, Uuid)>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let university = active_university(&state, id).await?;
    let specialty = state
        .store
        .specialty_by_id(specialty_id)
        .await?
        .filter(|s| s.university_id == university.id && s.is_active)
        .ok_or(AppError::NotFound("Specialty"))?;

    let admission_chance = ort_score(&state, caller)
        .await?
        .map(|score| chance_for(&specialty, score));

    let mut body = serde_json::to_value(&specialty).map_err(anyhow::Error::from)?;
    body["university"] = serde_json::to_value(&university).map_err(anyhow::Error::from)?;
    body["admissionChance"] = json!(admission_chance);

    Ok(Json(body))
}

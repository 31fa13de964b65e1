use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use bank::{
    models::{Question, QuestionOption, Role, Test, User},
    pdf::{POINTS_PER_QUESTION, parse_questions},
    scoring::MAX_QUESTION_POINTS,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::message;
use crate::{
    auth::{Admin, ContentManager, ensure_owner_or_admin},
    error::AppError,
    state::State as AppState,
    store::{
        NewQuestion, NewSubject, NewTest, QuestionPatch, SpecialtyFields, SpecialtyPatch,
        TestPatch, UniversityFields, UniversityPatch,
    },
    utils::{PageQuery, not_blank},
};

const MAX_PDF_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_SCORE: i32 = 100;
const PDF_PREVIEW_CHARS: usize = 500;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(users_handler))
        .route("/users/{id}/role", put(role_handler))
        .route("/subjects", post(create_subject_handler))
        .route("/subjects/{id}", delete(delete_subject_handler))
        .route("/tests", post(create_test_handler))
        .route(
            "/tests/upload-pdf",
            post(upload_pdf_handler).layer(DefaultBodyLimit::max(MAX_PDF_BYTES + 64 * 1024)),
        )
        .route(
            "/tests/{id}",
            put(update_test_handler).delete(delete_test_handler),
        )
        .route(
            "/tests/{id}/questions",
            get(questions_handler).post(create_question_handler),
        )
        .route(
            "/questions/{id}",
            put(update_question_handler).delete(delete_question_handler),
        )
        .route("/statistics", get(statistics_handler))
        .route(
            "/universities",
            get(universities_handler).post(create_university_handler),
        )
        .route(
            "/universities/{id}",
            put(update_university_handler).delete(delete_university_handler),
        )
        .route(
            "/universities/{id}/specialties",
            post(create_specialty_handler),
        )
        .route(
            "/specialties/{id}",
            put(update_specialty_handler).delete(delete_specialty_handler),
        )
}

// users

async fn users_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.resolve();
    let (users, total) = state.store.list_users(page.offset(), page.limit).await?;

    Ok(Json(json!({
        "users": users,
        "total": total,
        "page": page.page,
        "pages": page.pages(total),
    })))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

async fn role_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role: Role = payload
        .role
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid role".to_string()))?;

    let user = state
        .store
        .set_role(id, role)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    info!("Admin {} set role of {} to {role}", admin.id, user.id);

    Ok(Json(user))
}

// subjects

async fn create_subject_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(_): ContentManager,
    Json(payload): Json<NewSubject>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let subject = state.store.create_subject(payload).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn delete_subject_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_subject(id).await? {
        return Err(AppError::NotFound("Subject"));
    }
    Ok(message("Subject deleted"))
}

// tests

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestRequest {
    pub subject_id: Uuid,
    #[validate(custom(function = "not_blank", message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    #[validate(range(min = 1, message = "Time limit must be positive"))]
    pub time_limit: Option<i32>,
    #[validate(range(min = 1, message = "Max score must be positive"))]
    pub max_score: Option<i32>,
    #[serde(default)]
    pub is_main_ort: bool,
}

async fn create_test_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if state.store.subject_by_id(payload.subject_id).await?.is_none() {
        return Err(AppError::NotFound("Subject"));
    }

    let test = state
        .store
        .create_test(NewTest {
            subject_id: payload.subject_id,
            title: payload.title.trim().to_string(),
            description: payload.description,
            is_free: payload.is_free,
            time_limit: payload.time_limit,
            max_score: payload.max_score.unwrap_or(DEFAULT_MAX_SCORE),
            is_main_ort: payload.is_main_ort,
            created_by: user.id,
        })
        .await?;
    info!("User {} created test {}", user.id, test.id);

    Ok((StatusCode::CREATED, Json(test)))
}

/// Loads a test the caller may edit.
async fn owned_test(state: &AppState, id: Uuid, user: &User) -> Result<Test, AppError> {
    let test = state
        .store
        .test_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Test"))?;
    ensure_owner_or_admin(user, test.created_by)?;
    Ok(test)
}

async fn update_test_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Path(id): Path<Uuid>,
    Json(patch): Json<TestPatch>,
) -> Result<impl IntoResponse, AppError> {
    patch.validate()?;
    owned_test(&state, id, &user).await?;
    if let Some(subject_id) = patch.subject_id {
        if state.store.subject_by_id(subject_id).await?.is_none() {
            return Err(AppError::NotFound("Subject"));
        }
    }

    let test = state
        .store
        .update_test(id, patch)
        .await?
        .ok_or(AppError::NotFound("Test"))?;

    Ok(Json(test))
}

async fn delete_test_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    owned_test(&state, id, &user).await?;
    state.store.delete_test(id).await?;
    info!("User {} deleted test {id}", user.id);
    Ok(message("Test deleted"))
}

// questions

/// Options may be sent as plain strings or as `{text, isCorrect}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    Full(QuestionOption),
}

impl OptionInput {
    fn text(&self) -> &str {
        match self {
            OptionInput::Text(text) => text,
            OptionInput::Full(option) => &option.text,
        }
    }
}

/// Checks the answer key and marks exactly the keyed option correct.
fn keyed_options(options: &[OptionInput], correct_answer: i32) -> Result<Vec<QuestionOption>, AppError> {
    if options.len() < 2 {
        return Err(AppError::BadRequest(
            "At least two options are required".to_string(),
        ));
    }
    if options.iter().any(|o| o.text().trim().is_empty()) {
        return Err(AppError::BadRequest("Options cannot be empty".to_string()));
    }
    if correct_answer < 0 || correct_answer as usize >= options.len() {
        return Err(AppError::BadRequest(
            "Correct answer must point to one of the options".to_string(),
        ));
    }

    Ok(options
        .iter()
        .enumerate()
        .map(|(i, option)| QuestionOption {
            text: option.text().trim().to_string(),
            is_correct: i as i32 == correct_answer,
        })
        .collect())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(custom(function = "not_blank", message = "Question text is required"))]
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Vec<OptionInput>,
    pub correct_answer: i32,
    pub explanation: Option<String>,
    #[validate(range(min = 1, max = MAX_QUESTION_POINTS, message = "Points must be between 1 and 1000"))]
    pub points: Option<i32>,
}

async fn questions_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(_): ContentManager,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.test_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("Test"));
    }
    Ok(Json(state.store.questions_for_test(id).await?))
}

async fn create_question_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let test = owned_test(&state, id, &user).await?;
    let options = keyed_options(&payload.options, payload.correct_answer)?;

    let question = state
        .store
        .create_question(NewQuestion {
            test_id: test.id,
            question_text: payload.question_text.trim().to_string(),
            question_image: payload.question_image,
            options,
            correct_answer: payload.correct_answer,
            explanation: payload.explanation,
            points: payload.points.unwrap_or(1),
            created_by: user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(question)))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, message = "Question text cannot be empty"))]
    pub question_text: Option<String>,
    pub question_image: Option<String>,
    pub options: Option<Vec<OptionInput>>,
    pub correct_answer: Option<i32>,
    pub explanation: Option<String>,
    #[validate(range(min = 1, max = MAX_QUESTION_POINTS, message = "Points must be between 1 and 1000"))]
    pub points: Option<i32>,
}

/// Folds a partial update into a patch, rechecking the answer key whenever
/// options or the key change.
fn question_patch(current: &Question, update: UpdateQuestionRequest) -> Result<QuestionPatch, AppError> {
    let rekey = update.options.is_some() || update.correct_answer.is_some();
    let correct_answer = update.correct_answer.unwrap_or(current.correct_answer);
    let options = match (rekey, update.options) {
        (false, _) => None,
        (true, Some(options)) => Some(keyed_options(&options, correct_answer)?),
        (true, None) => {
            let current: Vec<OptionInput> = current
                .options
                .iter()
                .cloned()
                .map(OptionInput::Full)
                .collect();
            Some(keyed_options(&current, correct_answer)?)
        }
    };

    Ok(QuestionPatch {
        question_text: update.question_text.map(|t| t.trim().to_string()),
        question_image: update.question_image,
        correct_answer: options.as_ref().map(|_| correct_answer),
        options,
        explanation: update.explanation,
        points: update.points,
    })
}

async fn owned_question(
    state: &AppState,
    id: Uuid,
    user: &User,
) -> Result<Question, AppError> {
    let question = state
        .store
        .question_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Question"))?;
    ensure_owner_or_admin(user, question.created_by)?;
    Ok(question)
}

async fn update_question_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = owned_question(&state, id, &user).await?;
    let patch = question_patch(&current, payload)?;

    let question = state
        .store
        .update_question(id, patch)
        .await?
        .ok_or(AppError::NotFound("Question"))?;

    Ok(Json(question))
}

async fn delete_question_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    owned_question(&state, id, &user).await?;
    state.store.delete_question(id).await?;
    Ok(message("Question deleted"))
}

// pdf import

#[derive(Debug, Default)]
struct PdfUpload {
    pdf: Option<Vec<u8>>,
    subject_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    is_free: bool,
    time_limit: Option<i32>,
    max_score: Option<i32>,
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

fn positive(field: &str, value: &str) -> Result<Option<i32>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<i32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(AppError::BadRequest(format!("{field} must be a positive number"))),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<PdfUpload, AppError> {
    let mut upload = PdfUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "pdf" {
            if field.content_type() != Some("application/pdf") {
                return Err(AppError::BadRequest("Only PDF files are allowed".to_string()));
            }
            let bytes = field.bytes().await.map_err(bad_multipart)?;
            if bytes.len() > MAX_PDF_BYTES {
                return Err(AppError::BadRequest("PDF must be at most 10 MB".to_string()));
            }
            upload.pdf = Some(bytes.to_vec());
            continue;
        }

        let value = field.text().await.map_err(bad_multipart)?;
        match name.as_str() {
            "subjectId" => upload.subject_id = Some(value),
            "title" => upload.title = Some(value),
            "description" => upload.description = Some(value).filter(|v| !v.trim().is_empty()),
            "isFree" => upload.is_free = value.trim() == "true",
            "timeLimit" => upload.time_limit = positive("timeLimit", &value)?,
            "maxScore" => upload.max_score = positive("maxScore", &value)?,
            _ => {}
        }
    }

    Ok(upload)
}

async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    ContentManager(user): ContentManager,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_upload(multipart).await?;

    let pdf = upload
        .pdf
        .ok_or_else(|| AppError::BadRequest("PDF file is required".to_string()))?;
    let title = upload
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Title is required".to_string()))?;
    let subject_id = upload
        .subject_id
        .as_deref()
        .and_then(|id| id.trim().parse::<Uuid>().ok())
        .ok_or_else(|| AppError::BadRequest("A valid subjectId is required".to_string()))?;
    if state.store.subject_by_id(subject_id).await?.is_none() {
        return Err(AppError::NotFound("Subject"));
    }

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(|err| {
            warn!("PDF extraction failed: {err}");
            AppError::BadRequest("Could not read text from the PDF".to_string())
        })?;

    let parsed = parse_questions(&text);
    if parsed.is_empty() {
        let preview: String = text.chars().take(PDF_PREVIEW_CHARS).collect();
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": "No questions found in the PDF",
                "pdfText": preview,
            })),
        ));
    }

    let questions = parsed
        .into_iter()
        .map(|question| NewQuestion {
            test_id: Uuid::nil(),
            question_text: question.question_text,
            question_image: None,
            options: question.options,
            correct_answer: question.correct_answer,
            explanation: None,
            points: POINTS_PER_QUESTION,
            created_by: user.id,
        })
        .collect::<Vec<_>>();
    let max_score = upload
        .max_score
        .unwrap_or(POINTS_PER_QUESTION * questions.len() as i32);

    let (test, questions) = state
        .store
        .import_test(
            NewTest {
                subject_id,
                title,
                description: upload.description,
                is_free: upload.is_free,
                time_limit: upload.time_limit,
                max_score,
                is_main_ort: false,
                created_by: user.id,
            },
            questions,
        )
        .await?;
    info!(
        "User {} imported test {} with {} questions from PDF",
        user.id,
        test.id,
        questions.len()
    );

    let message = format!("Created test with {} questions", questions.len());
    Ok((
        StatusCode::CREATED,
        Json(json!({ "test": test, "questions": questions, "message": message })),
    ))
}

// statistics

async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
) -> Result<impl IntoResponse, AppError> {
    let counts = state.store.platform_counts(Utc::now()).await?;

    Ok(Json(json!({
        "totalUsers": counts.users,
        "totalTests": counts.tests,
        "totalResults": counts.results,
        "activeSubscriptions": counts.active_subscriptions,
    })))
}

// universities

async fn universities_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.store.list_universities(false).await?))
}

async fn create_university_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Json(payload): Json<UniversityFields>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let university = state.store.create_university(payload, admin.id).await?;
    Ok((StatusCode::CREATED, Json(university)))
}

async fn update_university_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Path(id): Path<Uuid>,
    Json(patch): Json<UniversityPatch>,
) -> Result<impl IntoResponse, AppError> {
    patch.validate()?;
    let university = state
        .store
        .update_university(id, patch)
        .await?
        .ok_or(AppError::NotFound("University"))?;
    Ok(Json(university))
}

async fn delete_university_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_university(id).await? {
        return Err(AppError::NotFound("University"));
    }
    Ok(message("University deleted"))
}

async fn create_specialty_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
    Json(payload): Json<SpecialtyFields>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if state.store.university_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("University"));
    }
    let specialty = state.store.create_specialty(id, payload, admin.id).await?;
    Ok((StatusCode::CREATED, Json(specialty)))
}

async fn update_specialty_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Path(id): Path<Uuid>,
    Json(patch): Json<SpecialtyPatch>,
) -> Result<impl IntoResponse, AppError> {
    patch.validate()?;
    let specialty = state
        .store
        .update_specialty(id, patch)
        .await?
        .ok_or(AppError::NotFound("Specialty"))?;
    Ok(Json(specialty))
}

async fn delete_specialty_handler(
    State(state): State<Arc<AppState>>,
    Admin(_): Admin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_specialty(id).await? {
        return Err(AppError::NotFound("Specialty"));
    }
    Ok(message("Specialty deleted"))
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json as JsonColumn;

    use super::*;

    fn texts(options: &[&str]) -> Vec<OptionInput> {
        options.iter().map(|o| OptionInput::Text(o.to_string())).collect()
    }

    fn stored_question(correct_answer: i32) -> Question {
        let now = Utc::now();
        Question {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            question_text: "2 + 2 = ?".to_string(),
            question_image: None,
            options: JsonColumn(keyed_options(&texts(&["3", "4", "5"]), correct_answer).unwrap()),
            correct_answer,
            explanation: None,
            points: 1,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_keyed_options_marks_only_the_key() {
        let options = keyed_options(&texts(&["3", " 4 ", "5"]), 1).unwrap();

        assert_eq!(options[1].text, "4");
        assert_eq!(
            options.iter().map(|o| o.is_correct).collect::<Vec<_>>(),
            vec![false, true, false]
        );
    }

    #[test]
    fn test_keyed_options_rejects_bad_input() {
        assert!(keyed_options(&texts(&["only"]), 0).is_err());
        assert!(keyed_options(&texts(&["a", "b"]), 2).is_err());
        assert!(keyed_options(&texts(&["a", "b"]), -1).is_err());
        assert!(keyed_options(&texts(&["a", "  "]), 0).is_err());
    }

    #[test]
    fn test_options_accept_both_shapes() {
        let options: Vec<OptionInput> =
            serde_json::from_str(r#"["a", {"text": "b", "isCorrect": true}]"#).unwrap();

        let keyed = keyed_options(&options, 0).unwrap();
        assert_eq!(keyed[1].text, "b");
        assert!(keyed[0].is_correct && !keyed[1].is_correct);
    }

    #[test]
    fn test_patch_without_key_change_keeps_options() {
        let current = stored_question(1);
        let patch = question_patch(
            &current,
            UpdateQuestionRequest {
                points: Some(3),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(patch.options.is_none() && patch.correct_answer.is_none());
        assert_eq!(patch.points, Some(3));
    }

    #[test]
    fn test_patch_moving_key_rekeys_current_options() {
        let current = stored_question(1);
        let patch = question_patch(
            &current,
            UpdateQuestionRequest {
                correct_answer: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

        let options = patch.options.unwrap();
        assert_eq!(patch.correct_answer, Some(2));
        assert!(options[2].is_correct && !options[1].is_correct);
    }

    #[test]
    fn test_patch_shrinking_options_checks_key() {
        let current = stored_question(2);
        let result = question_patch(
            &current,
            UpdateQuestionRequest {
                options: Some(texts(&["a", "b"])),
                ..Default::default()
            },
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_positive_fields() {
        assert_eq!(positive("timeLimit", " 45 ").unwrap(), Some(45));
        assert_eq!(positive("timeLimit", "").unwrap(), None);
        assert!(positive("maxScore", "0").is_err());
        assert!(positive("maxScore", "ten").is_err());
    }

    #[test]
    fn test_question_points_are_capped() {
        let request = |points| CreateQuestionRequest {
            question_text: "2 + 2?".to_string(),
            question_image: None,
            options: texts(&["3", "4"]),
            correct_answer: 1,
            explanation: None,
            points: Some(points),
        };

        assert!(request(MAX_QUESTION_POINTS).validate().is_ok());
        assert!(request(2_000_000_000).validate().is_err());
        assert!(request(0).validate().is_err());

        let update = UpdateQuestionRequest {
            points: Some(MAX_QUESTION_POINTS + 1),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}

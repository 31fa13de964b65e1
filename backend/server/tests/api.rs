// HTTP-level tests: the full router over the in-memory store, driven with
// tower::ServiceExt::oneshot without binding a socket.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use bank::models::{QuestionOption, Role};
use chrono::{Datelike, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{
    app,
    config::Config,
    state::State,
    store::{MemoryStore, NewQuestion, Store},
};
use tower::ServiceExt;
use uuid::Uuid;

fn config() -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        jwt_secret: "integration-secret".to_string(),
        jwt_expires_in: 3600,
        frontend_url: "http://localhost:3000".to_string(),
        mail: None,
        auto_migrate: false,
        password_memory_kib: 1024,
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = State::with_store(config(), store.clone()).unwrap();
        Self {
            app: app(state),
            store,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    /// Registers a user and returns `(token, id)`.
    async fn register(&self, phone: &str, extra: Value) -> (String, Uuid) {
        let mut body = json!({
            "phone": phone,
            "password": "secret123",
            "firstName": "Aigerim",
            "lastName": "Bekova",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }

        let (status, body) = self.post("/api/auth/register", None, body).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
        (token, id)
    }

    async fn register_as(&self, phone: &str, role: Role) -> (String, Uuid) {
        let (token, id) = self.register(phone, json!({})).await;
        self.store.set_role(id, role).await.unwrap();
        (token, id)
    }

    /// Creates a subject and a test with two one-point questions, answered
    /// by index 1 and 0. Returns the test id.
    async fn seed_test(&self, author: &str, is_free: bool) -> String {
        let (status, subject) = self
            .post("/api/admin/subjects", Some(author), json!({ "name": "Math" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{subject}");

        let (status, test) = self
            .post(
                "/api/admin/tests",
                Some(author),
                json!({
                    "subjectId": subject["id"],
                    "title": "Algebra basics",
                    "isFree": is_free,
                    "maxScore": 2,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{test}");
        let test_id = test["id"].as_str().unwrap().to_string();

        for (text, correct) in [("2 + 2 = ?", 1), ("3 * 3 = ?", 0)] {
            let (status, question) = self
                .post(
                    &format!("/api/admin/tests/{test_id}/questions"),
                    Some(author),
                    json!({
                        "questionText": text,
                        "options": ["9", "4", "6"],
                        "correctAnswer": correct,
                    }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{question}");
        }

        test_id
    }

    async fn question_ids(&self, test_id: &str, token: Option<&str>) -> Vec<String> {
        let (status, body) = self
            .get(&format!("/api/tests/{test_id}/questions"), token)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["id"].as_str().unwrap().to_string())
            .collect()
    }
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();

    let (status, body) = harness.get("/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_duplicate_phone_is_rejected() {
    let harness = Harness::new();
    harness.register("+996700111222", json!({})).await;

    let (status, body) = harness
        .post(
            "/api/auth/register",
            None,
            json!({
                "phone": "+996700111222",
                "password": "another1",
                "firstName": "Other",
                "lastName": "Person",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User with this phone already exists");
}

#[tokio::test]
async fn test_registration_validates_fields() {
    let harness = Harness::new();

    let (status, body) = harness
        .post(
            "/api/auth/register",
            None,
            json!({ "phone": " ", "password": "123", "firstName": "A", "lastName": "B" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"phone") && fields.contains(&"password"));
}

#[tokio::test]
async fn test_login_errors_do_not_reveal_which_part_failed() {
    let harness = Harness::new();
    harness.register("+996700111333", json!({})).await;

    let (unknown_status, unknown) = harness
        .post(
            "/api/auth/login",
            None,
            json!({ "phone": "+996700000000", "password": "secret123" }),
        )
        .await;
    let (wrong_status, wrong) = harness
        .post(
            "/api/auth/login",
            None,
            json!({ "phone": "+996700111333", "password": "wrong-password" }),
        )
        .await;

    assert_eq!(unknown_status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown, wrong);
    assert_eq!(wrong["message"], "Invalid credentials");

    let (status, body) = harness
        .post(
            "/api/auth/login",
            None,
            json!({ "phone": "+996700111333", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_me_requires_a_valid_token() {
    let harness = Harness::new();
    let (token, id) = harness.register("+996700111444", json!({})).await;

    let (status, body) = harness.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No token, authorization denied");

    let (status, body) = harness.get("/api/auth/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is not valid");

    let (status, body) = harness.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
}

#[tokio::test]
async fn test_forgot_password_returns_token_without_mail() {
    let harness = Harness::new();
    harness.register("+996700111555", json!({})).await;

    let (status, body) = harness
        .post(
            "/api/auth/forgot-password",
            None,
            json!({ "phone": "+996700111555" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = harness
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .post(
            "/api/auth/login",
            None,
            json!({ "phone": "+996700111555", "password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "password": "again-new-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_role_gates() {
    let harness = Harness::new();
    let (student, _) = harness.register("+996700222001", json!({})).await;
    let (repetitor, _) = harness.register_as("+996700222002", Role::Repetitor).await;

    let (status, _) = harness
        .post("/api/admin/subjects", Some(&student), json!({ "name": "History" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .post("/api/admin/subjects", Some(&repetitor), json!({ "name": "History" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = harness.get("/api/admin/users", Some(&repetitor)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Admin only.");
}

#[tokio::test]
async fn test_anonymous_submit_is_graded_but_not_saved() {
    let harness = Harness::new();
    let (author, _) = harness.register_as("+996700333001", Role::Repetitor).await;
    let test_id = harness.seed_test(&author, true).await;
    let questions = harness.question_ids(&test_id, None).await;

    let (status, body) = harness
        .post(
            &format!("/api/tests/{test_id}/submit"),
            None,
            json!({ "answers": [
                { "questionId": questions[0], "selectedAnswer": 1 },
                { "questionId": questions[1], "selectedAnswer": 2 },
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["score"], 1);
    assert_eq!(body["correctAnswers"], 1);
    assert_eq!(body["totalQuestions"], 2);
    assert_eq!(body["saved"], false);
    assert!(body["result"].is_null());
    assert_eq!(harness.store.platform_counts(Utc::now()).await.unwrap().results, 0);
}

#[tokio::test]
async fn test_authenticated_submit_saves_one_result() {
    let harness = Harness::new();
    let (author, _) = harness.register_as("+996700333002", Role::Repetitor).await;
    let (student, _) = harness.register("+996700333003", json!({})).await;
    let test_id = harness.seed_test(&author, true).await;
    let questions = harness.question_ids(&test_id, Some(&student)).await;

    let (status, body) = harness
        .post(
            &format!("/api/tests/{test_id}/submit"),
            Some(&student),
            json!({
                "answers": [
                    { "questionId": questions[0], "selectedAnswer": 1 },
                    { "questionId": questions[1], "selectedAnswer": 0 },
                    { "questionId": Uuid::new_v4(), "selectedAnswer": 0 },
                ],
                "timeSpent": 95,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["score"], 2);
    assert_eq!(body["saved"], true);
    assert_eq!(body["result"]["timeSpent"], 95);

    let (status, history) = harness.get("/api/users/history", Some(&student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 1);
    assert_eq!(history["results"][0]["test"]["subject"]["name"], "Math");

    let (status, detail) = harness
        .get(&format!("/api/users/test-result/{test_id}"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["detailedAnswers"].as_array().unwrap().len(), 2);
    assert_eq!(detail["saved"], true);
}

#[tokio::test]
async fn test_deleting_a_taken_test_keeps_history() {
    let harness = Harness::new();
    let (admin, _) = harness.register_as("+996700333010", Role::Admin).await;
    let (student, _) = harness.register("+996700333011", json!({})).await;
    let test_id = harness.seed_test(&admin, true).await;
    let questions = harness.question_ids(&test_id, Some(&student)).await;
    let (status, _) = harness
        .post(
            &format!("/api/tests/{test_id}/submit"),
            Some(&student),
            json!({ "answers": [{ "questionId": questions[0], "selectedAnswer": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .call(Method::DELETE, &format!("/api/admin/tests/{test_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness.get(&format!("/api/tests/{test_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = harness.get("/api/users/history", Some(&student)).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["results"][0]["test"]["title"], "Algebra basics");
    let (status, detail) = harness
        .get(&format!("/api/users/test-result/{test_id}"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["detailedAnswers"].as_array().unwrap().len(), 2);

    let subject_id = history["results"][0]["test"]["subjectId"].as_str().unwrap();
    let (status, body) = harness
        .call(Method::DELETE, &format!("/api/admin/subjects/{subject_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Subject has test results and cannot be deleted");

    let (_, history) = harness.get("/api/users/history", Some(&student)).await;
    assert_eq!(history["total"], 1);
}

#[tokio::test]
async fn test_untaken_test_is_removed_with_its_questions() {
    let harness = Harness::new();
    let (admin, _) = harness.register_as("+996700333012", Role::Admin).await;
    let test_id = harness.seed_test(&admin, true).await;

    let (status, _) = harness
        .call(Method::DELETE, &format!("/api/admin/tests/{test_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let id: Uuid = test_id.parse().unwrap();
    assert!(harness.store.test_by_id(id).await.unwrap().is_none());
    assert!(harness.store.questions_for_test(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_score_is_rejected() {
    let harness = Harness::new();
    let (author, author_id) = harness.register_as("+996700333013", Role::Repetitor).await;
    let test_id = harness.seed_test(&author, true).await;
    let id: Uuid = test_id.parse().unwrap();

    let (status, body) = harness
        .post(
            &format!("/api/admin/tests/{test_id}/questions"),
            Some(&author),
            json!({
                "questionText": "1 + 1 = ?",
                "options": ["2", "3"],
                "correctAnswer": 0,
                "points": 2_000_000_000,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let mut answers = Vec::new();
    for text in ["1 + 1 = ?", "2 + 2 = ?"] {
        let question = harness
            .store
            .create_question(NewQuestion {
                test_id: id,
                question_text: text.to_string(),
                question_image: None,
                options: vec![
                    QuestionOption {
                        text: "yes".to_string(),
                        is_correct: true,
                    },
                    QuestionOption {
                        text: "no".to_string(),
                        is_correct: false,
                    },
                ],
                correct_answer: 0,
                explanation: None,
                points: 2_000_000_000,
                created_by: author_id,
            })
            .await
            .unwrap();
        answers.push(json!({ "questionId": question.id, "selectedAnswer": 0 }));
    }

    let (status, body) = harness
        .post(
            &format!("/api/tests/{test_id}/submit"),
            None,
            json!({ "answers": answers }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Score does not fit in a result");
}

#[tokio::test]
async fn test_questions_hide_the_answer_key() {
    let harness = Harness::new();
    let (author, _) = harness.register_as("+996700333004", Role::Repetitor).await;
    let test_id = harness.seed_test(&author, true).await;

    let (_, body) = harness
        .get(&format!("/api/tests/{test_id}/questions"), None)
        .await;

    let question = &body["questions"][0];
    assert!(question.get("correctAnswer").is_none());
    assert_eq!(question["options"], json!(["9", "4", "6"]));
    assert_eq!(body["test"]["maxScore"], 2);
}

#[tokio::test]
async fn test_paid_test_needs_login_and_subscription() {
    let harness = Harness::new();
    let (author, _) = harness.register_as("+996700444001", Role::Repetitor).await;
    let (student, _) = harness.register("+996700444002", json!({})).await;
    let test_id = harness.seed_test(&author, false).await;
    let uri = format!("/api/tests/{test_id}/questions");

    let (status, _) = harness.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness.get(&uri, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = harness.get(&uri, Some(&student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Subscription required");

    let (status, _) = harness
        .post("/api/subscription", Some(&student), json!({ "duration": 30 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = harness.get(&uri, Some(&student)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_repurchase_keeps_a_single_active_subscription() {
    let harness = Harness::new();
    let (student, id) = harness.register("+996700555001", json!({})).await;

    for duration in [30, 90] {
        let (status, _) = harness
            .post(
                "/api/subscription",
                Some(&student),
                json!({ "duration": duration, "paymentId": "pay-1" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let subscriptions = harness.store.subscriptions_for_user(id).await.unwrap();
    let active: Vec<_> = subscriptions
        .iter()
        .filter(|s| s.is_active_at(Utc::now()))
        .collect();
    assert_eq!(subscriptions.len(), 2);
    assert_eq!(active.len(), 1);
    assert!(active[0].end_date - active[0].start_date >= chrono::Duration::days(90));

    let (status, _) = harness
        .post(
            "/api/subscription",
            Some(&student),
            json!({ "duration": 400 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_referral_pays_once() {
    let harness = Harness::new();
    let (referrer, referrer_id) = harness.register("+996700666001", json!({})).await;
    let (_, body) = harness.get("/api/rewards/referral-link", Some(&referrer)).await;
    let code = body["referralCode"].as_str().unwrap().to_string();
    assert!(body["referralLink"].as_str().unwrap().ends_with(&format!("?ref={code}")));

    let (status, _) = harness
        .post(
            "/api/auth/register",
            None,
            json!({
                "phone": "+996700666003",
                "password": "secret123",
                "firstName": "Bad",
                "lastName": "Code",
                "referralCode": "NOPE",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (friend, friend_id) = harness
        .register("+996700666002", json!({ "referralCode": code }))
        .await;
    for _ in 0..2 {
        harness
            .post("/api/subscription", Some(&friend), json!({}))
            .await;
    }

    let stored = harness.store.user_by_id(referrer_id).await.unwrap().unwrap();
    assert_eq!(stored.coins, 100);

    let (_, referrals) = harness.get("/api/rewards/referrals", Some(&referrer)).await;
    assert_eq!(referrals.as_array().unwrap().len(), 1);
    assert_eq!(referrals[0]["hasActiveSubscription"], true);

    let mut discounts: Vec<f64> = harness
        .store
        .subscriptions_for_user(friend_id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.discount_amount)
        .collect();
    discounts.sort_by(f64::total_cmp);
    assert_eq!(discounts, vec![0.0, 100.0]);
}

#[tokio::test]
async fn test_monthly_ranking_pays_the_bonus_once() {
    let harness = Harness::new();
    let (admin, _) = harness.register_as("+996700777001", Role::Admin).await;
    let (best, best_id) = harness.register("+996700777002", json!({})).await;
    let (other, _) = harness.register("+996700777003", json!({})).await;
    let test_id = harness.seed_test(&admin, true).await;
    let questions = harness.question_ids(&test_id, None).await;

    for (token, answers) in [(best.as_str(), [1, 0]), (other.as_str(), [1, 1])] {
        let (status, _) = harness
            .post(
                &format!("/api/tests/{test_id}/submit"),
                Some(token),
                json!({ "answers": [
                    { "questionId": questions[0], "selectedAnswer": answers[0] },
                    { "questionId": questions[1], "selectedAnswer": answers[1] },
                ]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let now = Utc::now();
    let request = json!({ "month": now.month(), "year": now.year(), "type": "country" });

    let (status, _) = harness
        .post("/api/rewards/calculate-monthly-ranking", Some(&best), request.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let (status, body) = harness
            .post("/api/rewards/calculate-monthly-ranking", Some(&admin), request.clone())
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["rankingsCount"], 2);
        assert_eq!(body["firstPlace"]["userId"], best_id.to_string());
    }

    let (_, coins) = harness.get("/api/rewards/coins", Some(&best)).await;
    assert_eq!(coins["coins"], 1000);

    let (_, rankings) = harness.get("/api/rewards/monthly-rankings", Some(&best)).await;
    assert_eq!(rankings.as_array().unwrap().len(), 1);
    assert_eq!(rankings[0]["rank"], 1);
    assert_eq!(rankings[0]["bonusAwarded"], true);
}

#[tokio::test]
async fn test_admission_chances_need_a_subscription() {
    let harness = Harness::new();
    let (admin, _) = harness.register_as("+996700888001", Role::Admin).await;
    let (student, _) = harness.register("+996700888002", json!({})).await;

    let (_, university) = harness
        .post("/api/admin/universities", Some(&admin), json!({ "name": "KNU" }))
        .await;
    let university_id = university["id"].as_str().unwrap().to_string();
    let (status, _) = harness
        .post(
            &format!("/api/admin/universities/{university_id}/specialties"),
            Some(&admin),
            json!({ "name": "Physics", "averageScore": 400 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = harness
        .post(
            &format!("/api/admin/universities/{university_id}/specialties"),
            Some(&admin),
            json!({ "name": "Physics", "averageScore": 1.0, "minScore": 0.5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = harness
        .get(&format!("/api/universities/{university_id}"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["specialties"].as_array().unwrap().len(), 1);
    assert!(body["admissionChances"].is_null());

    let (status, subject) = harness
        .post("/api/admin/subjects", Some(&admin), json!({ "name": "ORT" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, test) = harness
        .post(
            "/api/admin/tests",
            Some(&admin),
            json!({ "subjectId": subject["id"], "title": "Main ORT", "isFree": true, "isMainOrt": true }),
        )
        .await;
    let test_id = test["id"].as_str().unwrap().to_string();
    let (_, question) = harness
        .post(
            &format!("/api/admin/tests/{test_id}/questions"),
            Some(&admin),
            json!({ "questionText": "Pick A", "options": ["A", "B"], "correctAnswer": 0 }),
        )
        .await;
    harness
        .post("/api/subscription", Some(&student), json!({}))
        .await;
    harness
        .post(
            &format!("/api/tests/{test_id}/submit"),
            Some(&student),
            json!({ "answers": [{ "questionId": question["id"], "selectedAnswer": 0 }] }),
        )
        .await;

    let (_, body) = harness
        .get(&format!("/api/universities/{university_id}"), Some(&student))
        .await;
    let chance = &body["admissionChances"][0];
    assert_eq!(chance["userScore"], 1.0);
    assert_eq!(chance["chance"], 100);
    assert_eq!(chance["status"], "high");
}

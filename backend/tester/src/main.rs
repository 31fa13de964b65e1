//! Walks the public flow against a running server: health, register, login,
//! profile, a free test end to end, then history.
use anyhow::{Context, Result, bail};
use bank::{
    models::{PublicQuestion, Subject, Test},
    scoring::SubmittedAnswer,
};
use clap::Parser;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// API root, including `/api`.
    #[arg(long, default_value = "http://localhost:5000/api")]
    base: String,

    #[arg(long, default_value = "secret123")]
    password: String,
}

/// Carries its own token, every request states its auth explicitly.
struct ApiClient {
    http: Client,
    base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: Uuid,
    phone: String,
}

#[derive(Debug, Deserialize)]
struct Session {
    token: String,
    user: Account,
}

#[derive(Debug, Deserialize)]
struct Questions {
    questions: Vec<PublicQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submission {
    score: i32,
    max_score: i32,
    correct_answers: i32,
    total_questions: i32,
    saved: bool,
}

#[derive(Debug, Deserialize)]
struct SubjectWithTests {
    #[serde(flatten)]
    subject: Subject,
    tests: Vec<Test>,
}

impl ApiClient {
    fn new(base: &str) -> Self {
        Self {
            http: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    fn request(&self, method: Method, path: &str, authed: bool) -> Result<RequestBuilder> {
        let builder = self.http.request(method, format!("{}{path}", self.base));
        if !authed {
            return Ok(builder);
        }
        let token = self.token.as_deref().context("Not logged in")?;
        Ok(builder.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{status}: {body}");
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, authed: bool) -> Result<T> {
        self.send(self.request(Method::GET, path, authed)?).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, authed: bool, body: &Value) -> Result<T> {
        self.send(self.request(Method::POST, path, authed)?.json(body))
            .await
    }
}

fn random_phone() -> String {
    format!("+996{:09}", Uuid::new_v4().as_u128() % 1_000_000_000)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut client = ApiClient::new(&args.base);

    let health: Value = client.get("/health", false).await?;
    println!("Health: {}", health["status"]);

    let phone = random_phone();
    let registered: Session = client
        .post(
            "/auth/register",
            false,
            &json!({
                "phone": phone,
                "password": args.password,
                "firstName": "Smoke",
                "lastName": "Tester",
                "school": "School 1",
                "region": "Bishkek",
            }),
        )
        .await?;
    println!("Registered {} ({})", registered.user.phone, registered.user.id);

    let session: Session = client
        .post(
            "/auth/login",
            false,
            &json!({ "phone": phone, "password": args.password }),
        )
        .await?;
    client.token = Some(session.token);

    let me: Account = client.get("/auth/me", true).await?;
    if me.id != registered.user.id {
        bail!("Logged in as {} instead of {}", me.id, registered.user.id);
    }

    let subjects: Vec<SubjectWithTests> = client.get("/tests/subjects", false).await?;
    println!("Subjects: {}", subjects.len());

    let Some((subject, test)) = subjects.iter().find_map(|s| {
        s.tests
            .iter()
            .find(|t| t.is_free)
            .map(|t| (&s.subject, t))
    }) else {
        println!("No free tests, seed the database first");
        return Ok(());
    };
    println!("Taking {} ({})", test.title, subject.name);

    let questions: Questions = client
        .get(&format!("/tests/{}/questions", test.id), true)
        .await?;
    let answers: Vec<SubmittedAnswer> = questions
        .questions
        .iter()
        .map(|q| SubmittedAnswer {
            question_id: q.id,
            selected_answer: 0,
        })
        .collect();

    let submission: Submission = client
        .post(
            &format!("/tests/{}/submit", test.id),
            true,
            &json!({ "answers": answers, "timeSpent": 60 }),
        )
        .await?;
    println!(
        "Score {}/{} ({} of {} correct), saved: {}",
        submission.score,
        submission.max_score,
        submission.correct_answers,
        submission.total_questions,
        submission.saved
    );

    let history: Value = client.get("/users/history", true).await?;
    println!("History entries: {}", history["total"]);

    Ok(())
}

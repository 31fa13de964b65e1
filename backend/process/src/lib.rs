//! # Jobs
//!
//! One-off and periodic work run from the command line against the same
//! store the server uses.
//!
//! - `seed`: admin account, the core subjects and one free test per subject.
//!   Safe to rerun, existing rows are left alone.
//! - `rank`: monthly ranking for a month and scope, paying the country first
//!   place bonus. Rerunning refreshes the rows and never pays twice.
//! - `reset-password`: sets a new password for a phone, optionally granting
//!   the admin role.
//!
//! There is no scheduler. Run `rank` from cron at the start of each month,
//! it defaults to the month that just ended.
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bank::{
    models::{QuestionOption, RankingKind, Role, User},
    pdf::POINTS_PER_QUESTION,
};
use indicatif::{ProgressBar, ProgressStyle};
use server::{
    services::{Registration, RankingOutcome, register_user, run_monthly_ranking},
    state::State,
    store::{NewQuestion, NewSubject, NewTest, Store, TestFilter},
};
use tracing::info;

pub mod seed;

use seed::{FREE_TEST_TIME_LIMIT, SUBJECTS, SubjectTemplate};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub subjects_created: usize,
    pub tests_created: usize,
    pub questions_created: usize,
}

/// The admin account, created on first run.
async fn ensure_admin(state: &Arc<State>, phone: &str, password: &str) -> Result<User> {
    if let Some(user) = state.store.user_by_phone(phone).await? {
        info!("Admin user already exists");
        return Ok(user);
    }

    let user = register_user(
        state,
        Registration {
            phone: phone.to_string(),
            password: password.to_string(),
            first_name: "Администратор".to_string(),
            last_name: "Системы".to_string(),
            ..Default::default()
        },
        Role::Admin,
    )
    .await?;
    info!("Created admin user {phone}");

    Ok(user)
}

async fn seed_subject(
    store: &dyn Store,
    template: &SubjectTemplate,
    admin: &User,
    report: &mut SeedReport,
) -> Result<()> {
    let subject = match store
        .list_subjects()
        .await?
        .into_iter()
        .find(|s| s.name == template.name)
    {
        Some(subject) => subject,
        None => {
            report.subjects_created += 1;
            store
                .create_subject(NewSubject {
                    name: template.name.to_string(),
                    name_kg: Some(template.name_kg.to_string()),
                    description: Some(template.description.to_string()),
                    icon: None,
                })
                .await?
        }
    };

    let existing = store
        .list_tests(TestFilter {
            subject_id: Some(subject.id),
            free_only: true,
            active_only: true,
        })
        .await?;
    if !existing.is_empty() {
        info!("Free test already exists for {}", subject.name);
        return Ok(());
    }

    let questions = template.test.questions;
    let test = store
        .create_test(NewTest {
            subject_id: subject.id,
            title: template.test.title.to_string(),
            description: Some(template.test.description.to_string()),
            is_free: true,
            time_limit: Some(FREE_TEST_TIME_LIMIT),
            max_score: POINTS_PER_QUESTION * questions.len() as i32,
            is_main_ort: false,
            created_by: admin.id,
        })
        .await?;
    report.tests_created += 1;

    for question in questions {
        store
            .create_question(NewQuestion {
                test_id: test.id,
                question_text: question.text.to_string(),
                question_image: None,
                options: question
                    .options
                    .iter()
                    .enumerate()
                    .map(|(i, text)| QuestionOption {
                        text: text.to_string(),
                        is_correct: i as i32 == question.correct_answer,
                    })
                    .collect(),
                correct_answer: question.correct_answer,
                explanation: Some(question.explanation.to_string()),
                points: POINTS_PER_QUESTION,
                created_by: admin.id,
            })
            .await?;
        report.questions_created += 1;
    }
    info!("Created free test {} ({})", test.title, subject.name);

    Ok(())
}

pub async fn seed(state: &Arc<State>, admin_phone: &str, admin_password: &str) -> Result<SeedReport> {
    let admin = ensure_admin(state, admin_phone, admin_password).await?;
    let mut report = SeedReport::default();

    let pb = ProgressBar::new(SUBJECTS.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .context("Invalid progress template")?
        .progress_chars("=> "),
    );

    for template in SUBJECTS {
        pb.set_message(format!("Seeding {}", template.name));
        seed_subject(state.store.as_ref(), template, &admin, &mut report).await?;
        pb.inc(1);
    }

    pb.finish_with_message("Done");
    Ok(report)
}

pub async fn rank(
    store: &dyn Store,
    month: u32,
    year: i32,
    kind: RankingKind,
) -> Result<RankingOutcome> {
    Ok(run_monthly_ranking(store, month, year, kind).await?)
}

pub async fn reset_password(
    state: &Arc<State>,
    phone: &str,
    password: &str,
    make_admin: bool,
) -> Result<User> {
    if password.len() < 6 {
        bail!("Password must be at least 6 characters");
    }

    let user = state
        .store
        .user_by_phone(phone)
        .await?
        .with_context(|| format!("No user with phone {phone}"))?;

    let hash = state.passwords.hash(password)?;
    state.store.set_password(user.id, &hash).await?;
    info!("Password reset for {}", user.id);

    if make_admin && user.role != Role::Admin {
        state.store.set_role(user.id, Role::Admin).await?;
        info!("Granted admin role to {}", user.id);
    }

    Ok(state.store.user_by_id(user.id).await?.unwrap_or(user))
}

#[cfg(test)]
mod tests {
    use server::{config::Config, store::MemoryStore};

    use super::*;

    fn state() -> Arc<State> {
        let config = Config {
            port: 0,
            database_url: String::new(),
            jwt_secret: "jobs-secret".to_string(),
            jwt_expires_in: 60,
            frontend_url: "http://localhost:3000".to_string(),
            mail: None,
            auto_migrate: false,
            password_memory_kib: 1024,
        };
        State::with_store(config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let state = state();

        let first = seed(&state, "+996555000000", "admin123").await.unwrap();
        let second = seed(&state, "+996555000000", "admin123").await.unwrap();

        assert_eq!(first.subjects_created, SUBJECTS.len());
        assert_eq!(first.tests_created, SUBJECTS.len());
        assert_eq!(second, SeedReport::default());

        let admin = state.store.user_by_phone("+996555000000").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_reset_password_can_grant_admin() {
        let state = state();
        register_user(
            &state,
            Registration {
                phone: "+996700000001".to_string(),
                password: "old-password".to_string(),
                first_name: "Ulan".to_string(),
                last_name: "Toktogulov".to_string(),
                ..Default::default()
            },
            Role::User,
        )
        .await
        .unwrap();

        let user = reset_password(&state, "+996700000001", "new-password", true)
            .await
            .unwrap();

        assert_eq!(user.role, Role::Admin);
        assert!(state.passwords.verify("new-password", &user.password_hash));
        assert!(reset_password(&state, "+996700000002", "whatever", false).await.is_err());
        assert!(reset_password(&state, "+996700000001", "short", false).await.is_err());
    }
}

use std::collections::BTreeSet;

use async_trait::async_trait;
use bank::{
    models::{
        MonthlyRanking, Question, RankingKind, Role, Specialty, Subject, Subscription,
        SubscriptionStatus, Test, TestResult, University, User,
    },
    ranking::Standing,
    rewards::referral_terms,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    NewQuestion, NewResult, NewSubject, NewSubscription, NewTest, NewUser, PlatformCounts,
    ProfilePatch, QuestionPatch, SpecialtyFields, SpecialtyPatch, Store, StoreError, StoreResult,
    SUBJECT_HAS_RESULTS, TestFilter, TestPatch, UniversityFields, UniversityPatch, UserFilter,
};

fn test_row(new: NewTest, now: DateTime<Utc>) -> Test {
    Test {
        id: Uuid::new_v4(),
        subject_id: new.subject_id,
        title: new.title,
        description: new.description,
        is_free: new.is_free,
        time_limit: new.time_limit,
        max_score: new.max_score,
        created_by: new.created_by,
        is_active: true,
        is_main_ort: new.is_main_ort,
        created_at: now,
        updated_at: now,
    }
}

fn question_row(new: NewQuestion, now: DateTime<Utc>) -> Question {
    Question {
        id: Uuid::new_v4(),
        test_id: new.test_id,
        question_text: new.question_text,
        question_image: new.question_image,
        options: Json(new.options),
        correct_answer: new.correct_answer,
        explanation: new.explanation,
        points: new.points,
        created_by: new.created_by,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    subjects: Vec<Subject>,
    tests: Vec<Test>,
    questions: Vec<Question>,
    results: Vec<TestResult>,
    subscriptions: Vec<Subscription>,
    universities: Vec<University>,
    specialties: Vec<Specialty>,
    rankings: Vec<MonthlyRanking>,
}

/// In-process store. Every write takes the single table lock, so the
/// multi-row operations are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> DateTime<Utc>) {
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
}

fn page<T: Clone>(rows: &[T], offset: i64, limit: i64) -> Vec<T> {
    rows.iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn has_results(&self, test_id: Uuid) -> bool {
        self.results.iter().any(|r| r.test_id == test_id)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;

        if tables.users.iter().any(|u| u.phone == new.phone) {
            return Err(StoreError::Conflict(
                "User with this phone already exists".to_string(),
            ));
        }
        if tables
            .users
            .iter()
            .any(|u| u.referral_code.as_deref() == Some(new.referral_code.as_str()))
        {
            return Err(StoreError::Conflict("Referral code already taken".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            phone: new.phone,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            school: new.school,
            region: new.region,
            photo: None,
            role: new.role,
            is_email_verified: new.is_email_verified,
            email_verification_token: new.email_verification_token,
            reset_password_token: None,
            reset_password_expires: None,
            coins: 0,
            referral_code: Some(new.referral_code),
            referred_by: new.referred_by,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());

        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.referral_code.as_deref() == Some(code))
            .cloned())
    }

    async fn user_by_reset_token(&self, token: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.reset_password_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.user_mut(id) else {
            return Ok(None);
        };

        set(&mut user.first_name, patch.first_name);
        set(&mut user.last_name, patch.last_name);
        set_opt(&mut user.school, patch.school);
        set_opt(&mut user.region, patch.region);
        set_opt(&mut user.photo, patch.photo);
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.user_mut(id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.user_mut(id) {
            user.password_hash = password_hash.to_string();
            user.reset_password_token = None;
            user.reset_password_expires = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.user_mut(id) {
            user.reset_password_token = Some(token.to_string());
            user.reset_password_expires = Some(expires);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn verify_email(&self, token: &str) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };

        user.is_email_verified = true;
        user.email_verification_token = None;
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn set_referral_code(&self, id: Uuid, code: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.id != id && u.referral_code.as_deref() == Some(code))
        {
            return Err(StoreError::Conflict("Referral code already taken".to_string()));
        }
        if let Some(user) = tables.user_mut(id) {
            user.referral_code = Some(code.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> StoreResult<(Vec<User>, i64)> {
        let tables = self.tables.read().await;
        let mut users = tables.users.clone();
        newest_first(&mut users, |u| u.created_at);

        Ok((page(&users, offset, limit), users.len() as i64))
    }

    async fn users_matching(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| filter.school.is_none() || u.school == filter.school)
            .filter(|u| filter.region.is_none() || u.region == filter.region)
            .cloned()
            .collect())
    }

    async fn referrals_of(&self, referrer: Uuid) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .iter()
            .filter(|u| u.referred_by == Some(referrer))
            .cloned()
            .collect();
        newest_first(&mut users, |u| u.created_at);

        Ok(users)
    }

    async fn schools_and_regions(&self) -> StoreResult<(Vec<String>, Vec<String>)> {
        let tables = self.tables.read().await;
        let distinct = |pick: fn(&User) -> Option<&String>| -> Vec<String> {
            tables
                .users
                .iter()
                .filter_map(pick)
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        Ok((distinct(|u| u.school.as_ref()), distinct(|u| u.region.as_ref())))
    }

    async fn create_subject(&self, new: NewSubject) -> StoreResult<Subject> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let subject = Subject {
            id: Uuid::new_v4(),
            name: new.name,
            name_kg: new.name_kg,
            description: new.description,
            icon: new.icon,
            created_at: now,
            updated_at: now,
        };
        tables.subjects.push(subject.clone());

        Ok(subject)
    }

    async fn list_subjects(&self) -> StoreResult<Vec<Subject>> {
        let tables = self.tables.read().await;
        let mut subjects = tables.subjects.clone();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(subjects)
    }

    async fn subject_by_id(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        let tables = self.tables.read().await;
        Ok(tables.subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.subjects.iter().any(|s| s.id == id) {
            return Ok(false);
        }

        let test_ids: Vec<Uuid> = tables
            .tests
            .iter()
            .filter(|t| t.subject_id == id)
            .map(|t| t.id)
            .collect();
        if test_ids.iter().any(|test_id| tables.has_results(*test_id)) {
            return Err(StoreError::Conflict(SUBJECT_HAS_RESULTS.to_string()));
        }

        tables.subjects.retain(|s| s.id != id);
        tables.tests.retain(|t| t.subject_id != id);
        tables.questions.retain(|q| !test_ids.contains(&q.test_id));
        Ok(true)
    }

    async fn create_test(&self, new: NewTest) -> StoreResult<Test> {
        let mut tables = self.tables.write().await;
        let test = test_row(new, Utc::now());
        tables.tests.push(test.clone());

        Ok(test)
    }

    async fn test_by_id(&self, id: Uuid) -> StoreResult<Option<Test>> {
        let tables = self.tables.read().await;
        Ok(tables.tests.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tests(&self, filter: TestFilter) -> StoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut tests: Vec<Test> = tables
            .tests
            .iter()
            .filter(|t| filter.subject_id.is_none_or(|id| t.subject_id == id))
            .filter(|t| !filter.free_only || t.is_free)
            .filter(|t| !filter.active_only || t.is_active)
            .cloned()
            .collect();
        newest_first(&mut tests, |t| t.created_at);

        Ok(tests)
    }

    async fn tests_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tests
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn update_test(&self, id: Uuid, patch: TestPatch) -> StoreResult<Option<Test>> {
        let mut tables = self.tables.write().await;
        let Some(test) = tables.tests.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };

        set(&mut test.subject_id, patch.subject_id);
        set(&mut test.title, patch.title);
        set_opt(&mut test.description, patch.description);
        set(&mut test.is_free, patch.is_free);
        set_opt(&mut test.time_limit, patch.time_limit);
        set(&mut test.max_score, patch.max_score);
        set(&mut test.is_active, patch.is_active);
        set(&mut test.is_main_ort, patch.is_main_ort);
        test.updated_at = Utc::now();

        Ok(Some(test.clone()))
    }

    async fn delete_test(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(index) = tables.tests.iter().position(|t| t.id == id) else {
            return Ok(false);
        };

        if tables.has_results(id) {
            let test = &mut tables.tests[index];
            test.is_active = false;
            test.updated_at = Utc::now();
        } else {
            tables.tests.remove(index);
            tables.questions.retain(|q| q.test_id != id);
        }
        Ok(true)
    }

    async fn import_test(
        &self,
        new: NewTest,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<(Test, Vec<Question>)> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let test = test_row(new, now);
        let questions: Vec<Question> = questions
            .into_iter()
            .map(|q| question_row(NewQuestion { test_id: test.id, ..q }, now))
            .collect();

        tables.tests.push(test.clone());
        tables.questions.extend(questions.iter().cloned());
        Ok((test, questions))
    }

    async fn main_ort_test(&self) -> StoreResult<Option<Test>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tests
            .iter()
            .filter(|t| t.is_main_ort && t.is_active)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn create_question(&self, new: NewQuestion) -> StoreResult<Question> {
        let mut tables = self.tables.write().await;
        let question = question_row(new, Utc::now());
        tables.questions.push(question.clone());

        Ok(question)
    }

    async fn questions_for_test(&self, test_id: Uuid) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect())
    }

    async fn question_by_id(&self, id: Uuid) -> StoreResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn update_question(
        &self,
        id: Uuid,
        patch: QuestionPatch,
    ) -> StoreResult<Option<Question>> {
        let mut tables = self.tables.write().await;
        let Some(question) = tables.questions.iter_mut().find(|q| q.id == id) else {
            return Ok(None);
        };

        set(&mut question.question_text, patch.question_text);
        set_opt(&mut question.question_image, patch.question_image);
        set(&mut question.options, patch.options.map(Json));
        set(&mut question.correct_answer, patch.correct_answer);
        set_opt(&mut question.explanation, patch.explanation);
        set(&mut question.points, patch.points);
        question.updated_at = Utc::now();

        Ok(Some(question.clone()))
    }

    async fn delete_question(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.questions.len();
        tables.questions.retain(|q| q.id != id);

        Ok(tables.questions.len() != before)
    }

    async fn create_result(&self, new: NewResult) -> StoreResult<TestResult> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let result = TestResult {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            test_id: new.test_id,
            score: new.score,
            max_score: new.max_score,
            correct_answers: new.correct_answers,
            total_questions: new.total_questions,
            time_spent: new.time_spent,
            answers: Json(new.answers),
            started_at: new.started_at,
            completed_at: new.completed_at,
            created_at: now,
            updated_at: now,
        };
        tables.results.push(result.clone());

        Ok(result)
    }

    async fn results_page(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<TestResult>, i64)> {
        let results = self.results_for_user(user_id).await?;
        Ok((page(&results, offset, limit), results.len() as i64))
    }

    async fn results_for_user(&self, user_id: Uuid) -> StoreResult<Vec<TestResult>> {
        let tables = self.tables.read().await;
        let mut results: Vec<TestResult> = tables
            .results
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut results, |r| r.completed_at);

        Ok(results)
    }

    async fn results_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<TestResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| user_ids.contains(&r.user_id))
            .cloned()
            .collect())
    }

    async fn latest_result(&self, user_id: Uuid, test_id: Uuid) -> StoreResult<Option<TestResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.user_id == user_id && r.test_id == test_id)
            .max_by_key(|r| r.completed_at)
            .cloned())
    }

    async fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<TestResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.completed_at >= start && r.completed_at < end)
            .cloned()
            .collect())
    }

    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .max_by_key(|s| s.end_date)
            .cloned())
    }

    async fn subscriptions_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut subscriptions, |s| s.created_at);

        Ok(subscriptions)
    }

    async fn purchase_subscription(&self, purchase: NewSubscription) -> StoreResult<Subscription> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let previous = tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == purchase.user_id)
            .count();
        let referrer = tables
            .users
            .iter()
            .find(|u| u.id == purchase.user_id)
            .and_then(|u| u.referred_by);
        let terms = referral_terms(referrer.is_some(), previous);

        for subscription in tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == purchase.user_id && s.status == SubscriptionStatus::Active)
        {
            subscription.status = SubscriptionStatus::Expired;
            subscription.updated_at = now;
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: purchase.user_id,
            status: SubscriptionStatus::Active,
            start_date: purchase.start_date,
            end_date: purchase.end_date,
            auto_renew: true,
            payment_id: purchase.payment_id,
            discount_amount: terms.map_or(0.0, |(discount, _)| discount),
            created_at: now,
            updated_at: now,
        };
        tables.subscriptions.push(subscription.clone());

        if let (Some(referrer), Some((_, coins))) = (referrer, terms) {
            if let Some(user) = tables.user_mut(referrer) {
                user.coins += coins;
                user.updated_at = now;
            }
        }

        Ok(subscription)
    }

    async fn set_auto_renew(
        &self,
        user_id: Uuid,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>> {
        let mut tables = self.tables.write().await;
        let Some(subscription) = tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .max_by_key(|s| s.end_date)
        else {
            return Ok(None);
        };

        subscription.auto_renew = auto_renew;
        subscription.updated_at = now;

        Ok(Some(subscription.clone()))
    }

    async fn list_universities(&self, active_only: bool) -> StoreResult<Vec<University>> {
        let tables = self.tables.read().await;
        let mut universities: Vec<University> = tables
            .universities
            .iter()
            .filter(|u| !active_only || u.is_active)
            .cloned()
            .collect();
        universities.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(universities)
    }

    async fn university_by_id(&self, id: Uuid) -> StoreResult<Option<University>> {
        let tables = self.tables.read().await;
        Ok(tables.universities.iter().find(|u| u.id == id).cloned())
    }

    async fn create_university(
        &self,
        fields: UniversityFields,
        created_by: Uuid,
    ) -> StoreResult<University> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let university = University {
            id: Uuid::new_v4(),
            name: fields.name,
            name_kg: fields.name_kg,
            description: fields.description,
            photo: fields.photo,
            address: fields.address,
            website: fields.website,
            phone: fields.phone,
            email: fields.email,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        };
        tables.universities.push(university.clone());

        Ok(university)
    }

    async fn update_university(
        &self,
        id: Uuid,
        patch: UniversityPatch,
    ) -> StoreResult<Option<University>> {
        let mut tables = self.tables.write().await;
        let Some(university) = tables.universities.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };

        set(&mut university.name, patch.name);
        set_opt(&mut university.name_kg, patch.name_kg);
        set_opt(&mut university.description, patch.description);
        set_opt(&mut university.photo, patch.photo);
        set_opt(&mut university.address, patch.address);
        set_opt(&mut university.website, patch.website);
        set_opt(&mut university.phone, patch.phone);
        set_opt(&mut university.email, patch.email);
        set(&mut university.is_active, patch.is_active);
        university.updated_at = Utc::now();

        Ok(Some(university.clone()))
    }

    async fn delete_university(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.universities.len();
        tables.universities.retain(|u| u.id != id);
        tables.specialties.retain(|s| s.university_id != id);

        Ok(tables.universities.len() != before)
    }

    async fn specialties_for(
        &self,
        university_id: Uuid,
        active_only: bool,
    ) -> StoreResult<Vec<Specialty>> {
        let tables = self.tables.read().await;
        let mut specialties: Vec<Specialty> = tables
            .specialties
            .iter()
            .filter(|s| s.university_id == university_id)
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        specialties.sort_by(|a, b| a.average_score.total_cmp(&b.average_score));

        Ok(specialties)
    }

    async fn specialty_by_id(&self, id: Uuid) -> StoreResult<Option<Specialty>> {
        let tables = self.tables.read().await;
        Ok(tables.specialties.iter().find(|s| s.id == id).cloned())
    }

    async fn create_specialty(
        &self,
        university_id: Uuid,
        fields: SpecialtyFields,
        created_by: Uuid,
    ) -> StoreResult<Specialty> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let specialty = Specialty {
            id: Uuid::new_v4(),
            university_id,
            name: fields.name,
            name_kg: fields.name_kg,
            description: fields.description,
            average_score: fields.average_score,
            min_score: fields.min_score,
            max_score: fields.max_score,
            duration: fields.duration,
            degree: fields.degree,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        };
        tables.specialties.push(specialty.clone());

        Ok(specialty)
    }

    async fn update_specialty(
        &self,
        id: Uuid,
        patch: SpecialtyPatch,
    ) -> StoreResult<Option<Specialty>> {
        let mut tables = self.tables.write().await;
        let Some(specialty) = tables.specialties.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };

        set(&mut specialty.name, patch.name);
        set_opt(&mut specialty.name_kg, patch.name_kg);
        set_opt(&mut specialty.description, patch.description);
        set(&mut specialty.average_score, patch.average_score);
        set_opt(&mut specialty.min_score, patch.min_score);
        set_opt(&mut specialty.max_score, patch.max_score);
        set_opt(&mut specialty.duration, patch.duration);
        set(&mut specialty.degree, patch.degree);
        set(&mut specialty.is_active, patch.is_active);
        specialty.updated_at = Utc::now();

        Ok(Some(specialty.clone()))
    }

    async fn delete_specialty(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.specialties.len();
        tables.specialties.retain(|s| s.id != id);

        Ok(tables.specialties.len() != before)
    }

    async fn upsert_rankings(
        &self,
        month: i32,
        year: i32,
        kind: RankingKind,
        standings: &[Standing],
    ) -> StoreResult<Vec<MonthlyRanking>> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut saved = Vec::with_capacity(standings.len());

        for standing in standings {
            let existing = tables.rankings.iter_mut().find(|r| {
                r.user_id == standing.user_id && r.month == month && r.year == year && r.kind == kind
            });

            let ranking = match existing {
                Some(ranking) => {
                    ranking.rank = standing.rank;
                    ranking.avg_score = standing.avg_score;
                    ranking.total_tests = standing.total_tests;
                    ranking.updated_at = now;
                    ranking.clone()
                }
                None => {
                    let ranking = MonthlyRanking {
                        id: Uuid::new_v4(),
                        user_id: standing.user_id,
                        month,
                        year,
                        rank: standing.rank,
                        avg_score: standing.avg_score,
                        total_tests: standing.total_tests,
                        kind,
                        bonus_awarded: false,
                        created_at: now,
                        updated_at: now,
                    };
                    tables.rankings.push(ranking.clone());
                    ranking
                }
            };
            saved.push(ranking);
        }

        Ok(saved)
    }

    async fn award_bonus(&self, ranking_id: Uuid, coins: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let Some(ranking) = tables
            .rankings
            .iter_mut()
            .find(|r| r.id == ranking_id && !r.bonus_awarded)
        else {
            return Ok(false);
        };
        ranking.bonus_awarded = true;
        ranking.updated_at = now;
        let user_id = ranking.user_id;

        if let Some(user) = tables.user_mut(user_id) {
            user.coins += coins;
            user.updated_at = now;
        }

        Ok(true)
    }

    async fn rankings_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<MonthlyRanking>> {
        let tables = self.tables.read().await;
        let mut rankings: Vec<MonthlyRanking> = tables
            .rankings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rankings.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
        rankings.truncate(limit.max(0) as usize);

        Ok(rankings)
    }

    async fn platform_counts(&self, now: DateTime<Utc>) -> StoreResult<PlatformCounts> {
        let tables = self.tables.read().await;
        Ok(PlatformCounts {
            users: tables.users.len() as i64,
            tests: tables.tests.len() as i64,
            results: tables.results.len() as i64,
            active_subscriptions: tables
                .subscriptions
                .iter()
                .filter(|s| s.is_active_at(now))
                .count() as i64,
        })
    }
}

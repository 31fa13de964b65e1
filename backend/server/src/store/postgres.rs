use async_trait::async_trait;
use bank::{
    models::{
        MonthlyRanking, Question, RankingKind, Role, Specialty, Subject, Subscription, Test,
        TestResult, University, User,
    },
    ranking::Standing,
    rewards::referral_terms,
};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, types::Json};
use tracing::info;
use uuid::Uuid;

use super::{
    NewQuestion, NewResult, NewSubject, NewSubscription, NewTest, NewUser, PlatformCounts,
    ProfilePatch, QuestionPatch, SpecialtyFields, SpecialtyPatch, Store, StoreError, StoreResult,
    SUBJECT_HAS_RESULTS, TestFilter, TestPatch, UniversityFields, UniversityPatch, UserFilter,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A foreign key still points at the row, e.g. a result racing a delete.
fn restricted(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return StoreError::Conflict("Record is still referenced".to_string());
        }
    }
    StoreError::Database(err)
}

async fn insert_test<'e>(db: impl PgExecutor<'e>, new: NewTest) -> StoreResult<Test> {
    Ok(sqlx::query_as(
        "INSERT INTO tests (id, subject_id, title, description, is_free, time_limit, \
         max_score, is_main_ort, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(new.subject_id)
    .bind(new.title)
    .bind(new.description)
    .bind(new.is_free)
    .bind(new.time_limit)
    .bind(new.max_score)
    .bind(new.is_main_ort)
    .bind(new.created_by)
    .fetch_one(db)
    .await?)
}

async fn insert_question<'e>(db: impl PgExecutor<'e>, new: NewQuestion) -> StoreResult<Question> {
    Ok(sqlx::query_as(
        "INSERT INTO questions (id, test_id, question_text, question_image, options, \
         correct_answer, explanation, points, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(new.test_id)
    .bind(new.question_text)
    .bind(new.question_image)
    .bind(Json(new.options))
    .bind(new.correct_answer)
    .bind(new.explanation)
    .bind(new.points)
    .bind(new.created_by)
    .fetch_one(db)
    .await?)
}

/// Maps unique violations onto [`StoreError::Conflict`].
fn unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some("users_phone_key") => "User with this phone already exists",
                Some("users_referral_code_key") => "Referral code already taken",
                _ => "Record already exists",
            };
            return StoreError::Conflict(message.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, phone, email, password_hash, first_name, last_name, school, \
             region, role, is_email_verified, email_verification_token, referral_code, referred_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new.phone)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.school)
        .bind(&new.region)
        .bind(new.role)
        .bind(new.is_email_verified)
        .bind(&new.email_verification_token)
        .bind(&new.referral_code)
        .bind(new.referred_by)
        .fetch_one(&self.pool)
        .await
        .map_err(unique)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_reset_token(&self, token: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE reset_password_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as(
            "UPDATE users SET first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), school = COALESCE($4, school), \
             region = COALESCE($5, region), photo = COALESCE($6, photo), updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.school)
        .bind(patch.region)
        .bind(patch.photo)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as("UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *")
                .bind(id)
                .bind(role)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, reset_password_token = NULL, \
             reset_password_expires = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET reset_password_token = $2, reset_password_expires = $3, \
             updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn verify_email(&self, token: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as(
            "UPDATE users SET is_email_verified = TRUE, email_verification_token = NULL, \
             updated_at = now() WHERE email_verification_token = $1 RETURNING *",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_referral_code(&self, id: Uuid, code: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET referral_code = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(unique)?;
        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> StoreResult<(Vec<User>, i64)> {
        let users = sqlx::query_as(
            "SELECT * FROM users ORDER BY created_at DESC, id OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn users_matching(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as(
            "SELECT * FROM users WHERE ($1::text IS NULL OR school = $1) \
             AND ($2::text IS NULL OR region = $2)",
        )
        .bind(filter.school)
        .bind(filter.region)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn referrals_of(&self, referrer: Uuid) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as("SELECT * FROM users WHERE referred_by = $1 ORDER BY created_at DESC")
                .bind(referrer)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn schools_and_regions(&self) -> StoreResult<(Vec<String>, Vec<String>)> {
        let schools = sqlx::query_scalar(
            "SELECT DISTINCT school FROM users WHERE school IS NOT NULL AND school <> '' \
             ORDER BY school",
        )
        .fetch_all(&self.pool)
        .await?;
        let regions = sqlx::query_scalar(
            "SELECT DISTINCT region FROM users WHERE region IS NOT NULL AND region <> '' \
             ORDER BY region",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok((schools, regions))
    }

    async fn create_subject(&self, new: NewSubject) -> StoreResult<Subject> {
        Ok(sqlx::query_as(
            "INSERT INTO subjects (id, name, name_kg, description, icon) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.name)
        .bind(new.name_kg)
        .bind(new.description)
        .bind(new.icon)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_subjects(&self) -> StoreResult<Vec<Subject>> {
        Ok(sqlx::query_as("SELECT * FROM subjects ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn subject_by_id(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        Ok(sqlx::query_as("SELECT * FROM subjects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_subject(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let has_results: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM test_results r JOIN tests t ON t.id = r.test_id \
             WHERE t.subject_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if has_results {
            return Err(StoreError::Conflict(SUBJECT_HAS_RESULTS.to_string()));
        }

        let done = sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(restricted)?;
        tx.commit().await?;

        Ok(done.rows_affected() > 0)
    }

    async fn create_test(&self, new: NewTest) -> StoreResult<Test> {
        insert_test(&self.pool, new).await
    }

    async fn test_by_id(&self, id: Uuid) -> StoreResult<Option<Test>> {
        Ok(sqlx::query_as("SELECT * FROM tests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_tests(&self, filter: TestFilter) -> StoreResult<Vec<Test>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tests WHERE ($1::uuid IS NULL OR subject_id = $1) \
             AND (NOT $2 OR is_free) AND (NOT $3 OR is_active) ORDER BY created_at DESC",
        )
        .bind(filter.subject_id)
        .bind(filter.free_only)
        .bind(filter.active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn tests_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Test>> {
        Ok(sqlx::query_as("SELECT * FROM tests WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_test(&self, id: Uuid, patch: TestPatch) -> StoreResult<Option<Test>> {
        Ok(sqlx::query_as(
            "UPDATE tests SET subject_id = COALESCE($2, subject_id), title = COALESCE($3, title), \
             description = COALESCE($4, description), is_free = COALESCE($5, is_free), \
             time_limit = COALESCE($6, time_limit), max_score = COALESCE($7, max_score), \
             is_active = COALESCE($8, is_active), is_main_ort = COALESCE($9, is_main_ort), \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.subject_id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.is_free)
        .bind(patch.time_limit)
        .bind(patch.max_score)
        .bind(patch.is_active)
        .bind(patch.is_main_ort)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_test(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query(
            "UPDATE tests SET is_active = FALSE, updated_at = now() \
             WHERE id = $1 AND EXISTS (SELECT 1 FROM test_results WHERE test_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let removed = if deactivated == 0 {
            sqlx::query("DELETE FROM tests WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(restricted)?
                .rows_affected()
        } else {
            0
        };
        tx.commit().await?;

        Ok(deactivated + removed > 0)
    }

    async fn import_test(
        &self,
        new: NewTest,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<(Test, Vec<Question>)> {
        let mut tx = self.pool.begin().await?;

        let test = insert_test(&mut *tx, new).await?;
        let mut inserted = Vec::with_capacity(questions.len());
        for question in questions {
            inserted.push(
                insert_question(
                    &mut *tx,
                    NewQuestion {
                        test_id: test.id,
                        ..question
                    },
                )
                .await?,
            );
        }
        tx.commit().await?;

        Ok((test, inserted))
    }

    async fn main_ort_test(&self) -> StoreResult<Option<Test>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tests WHERE is_main_ort AND is_active ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_question(&self, new: NewQuestion) -> StoreResult<Question> {
        insert_question(&self.pool, new).await
    }

    async fn questions_for_test(&self, test_id: Uuid) -> StoreResult<Vec<Question>> {
        Ok(
            sqlx::query_as("SELECT * FROM questions WHERE test_id = $1 ORDER BY created_at, id")
                .bind(test_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn question_by_id(&self, id: Uuid) -> StoreResult<Option<Question>> {
        Ok(sqlx::query_as("SELECT * FROM questions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_question(
        &self,
        id: Uuid,
        patch: QuestionPatch,
    ) -> StoreResult<Option<Question>> {
        Ok(sqlx::query_as(
            "UPDATE questions SET question_text = COALESCE($2, question_text), \
             question_image = COALESCE($3, question_image), options = COALESCE($4, options), \
             correct_answer = COALESCE($5, correct_answer), \
             explanation = COALESCE($6, explanation), points = COALESCE($7, points), \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.question_text)
        .bind(patch.question_image)
        .bind(patch.options.map(Json))
        .bind(patch.correct_answer)
        .bind(patch.explanation)
        .bind(patch.points)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_question(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_result(&self, new: NewResult) -> StoreResult<TestResult> {
        Ok(sqlx::query_as(
            "INSERT INTO test_results (id, user_id, test_id, score, max_score, correct_answers, \
             total_questions, time_spent, answers, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.test_id)
        .bind(new.score)
        .bind(new.max_score)
        .bind(new.correct_answers)
        .bind(new.total_questions)
        .bind(new.time_spent)
        .bind(Json(new.answers))
        .bind(new.started_at)
        .bind(new.completed_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn results_page(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<TestResult>, i64)> {
        let results = sqlx::query_as(
            "SELECT * FROM test_results WHERE user_id = $1 \
             ORDER BY completed_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM test_results WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((results, total))
    }

    async fn results_for_user(&self, user_id: Uuid) -> StoreResult<Vec<TestResult>> {
        Ok(sqlx::query_as(
            "SELECT * FROM test_results WHERE user_id = $1 ORDER BY completed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn results_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<TestResult>> {
        Ok(sqlx::query_as("SELECT * FROM test_results WHERE user_id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn latest_result(&self, user_id: Uuid, test_id: Uuid) -> StoreResult<Option<TestResult>> {
        Ok(sqlx::query_as(
            "SELECT * FROM test_results WHERE user_id = $1 AND test_id = $2 \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<TestResult>> {
        Ok(sqlx::query_as(
            "SELECT * FROM test_results WHERE completed_at >= $1 AND completed_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>> {
        Ok(sqlx::query_as(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'active' \
             AND end_date > $2 ORDER BY end_date DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn subscriptions_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Subscription>> {
        Ok(sqlx::query_as(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn purchase_subscription(&self, purchase: NewSubscription) -> StoreResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent purchases by the same user.
        let referrer: Option<Uuid> = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT referred_by FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(purchase.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();
        let previous: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
                .bind(purchase.user_id)
                .fetch_one(&mut *tx)
                .await?;
        let terms = referral_terms(referrer.is_some(), previous as usize);

        sqlx::query(
            "UPDATE subscriptions SET status = 'expired', updated_at = now() \
             WHERE user_id = $1 AND status = 'active'",
        )
        .bind(purchase.user_id)
        .execute(&mut *tx)
        .await?;

        let subscription: Subscription = sqlx::query_as(
            "INSERT INTO subscriptions (id, user_id, status, start_date, end_date, payment_id, \
             discount_amount) VALUES ($1, $2, 'active', $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(purchase.user_id)
        .bind(purchase.start_date)
        .bind(purchase.end_date)
        .bind(purchase.payment_id)
        .bind(terms.map_or(0.0, |(discount, _)| discount))
        .fetch_one(&mut *tx)
        .await?;

        if let (Some(referrer), Some((_, coins))) = (referrer, terms) {
            sqlx::query("UPDATE users SET coins = coins + $2, updated_at = now() WHERE id = $1")
                .bind(referrer)
                .bind(coins)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(subscription)
    }

    async fn set_auto_renew(
        &self,
        user_id: Uuid,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Subscription>> {
        Ok(sqlx::query_as(
            "UPDATE subscriptions SET auto_renew = $2, updated_at = now() WHERE id = ( \
             SELECT id FROM subscriptions WHERE user_id = $1 AND status = 'active' \
             AND end_date > $3 ORDER BY end_date DESC LIMIT 1) RETURNING *",
        )
        .bind(user_id)
        .bind(auto_renew)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_universities(&self, active_only: bool) -> StoreResult<Vec<University>> {
        Ok(sqlx::query_as(
            "SELECT * FROM universities WHERE (NOT $1 OR is_active) ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn university_by_id(&self, id: Uuid) -> StoreResult<Option<University>> {
        Ok(sqlx::query_as("SELECT * FROM universities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_university(
        &self,
        fields: UniversityFields,
        created_by: Uuid,
    ) -> StoreResult<University> {
        Ok(sqlx::query_as(
            "INSERT INTO universities (id, name, name_kg, description, photo, address, website, \
             phone, email, created_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(fields.name)
        .bind(fields.name_kg)
        .bind(fields.description)
        .bind(fields.photo)
        .bind(fields.address)
        .bind(fields.website)
        .bind(fields.phone)
        .bind(fields.email)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_university(
        &self,
        id: Uuid,
        patch: UniversityPatch,
    ) -> StoreResult<Option<University>> {
        Ok(sqlx::query_as(
            "UPDATE universities SET name = COALESCE($2, name), name_kg = COALESCE($3, name_kg), \
             description = COALESCE($4, description), photo = COALESCE($5, photo), \
             address = COALESCE($6, address), website = COALESCE($7, website), \
             phone = COALESCE($8, phone), email = COALESCE($9, email), \
             is_active = COALESCE($10, is_active), updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.name_kg)
        .bind(patch.description)
        .bind(patch.photo)
        .bind(patch.address)
        .bind(patch.website)
        .bind(patch.phone)
        .bind(patch.email)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_university(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM universities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn specialties_for(
        &self,
        university_id: Uuid,
        active_only: bool,
    ) -> StoreResult<Vec<Specialty>> {
        Ok(sqlx::query_as(
            "SELECT * FROM specialties WHERE university_id = $1 AND (NOT $2 OR is_active) \
             ORDER BY average_score",
        )
        .bind(university_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn specialty_by_id(&self, id: Uuid) -> StoreResult<Option<Specialty>> {
        Ok(sqlx::query_as("SELECT * FROM specialties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_specialty(
        &self,
        university_id: Uuid,
        fields: SpecialtyFields,
        created_by: Uuid,
    ) -> StoreResult<Specialty> {
        Ok(sqlx::query_as(
            "INSERT INTO specialties (id, university_id, name, name_kg, description, \
             average_score, min_score, max_score, duration, degree, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(university_id)
        .bind(fields.name)
        .bind(fields.name_kg)
        .bind(fields.description)
        .bind(fields.average_score)
        .bind(fields.min_score)
        .bind(fields.max_score)
        .bind(fields.duration)
        .bind(fields.degree)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_specialty(
        &self,
        id: Uuid,
        patch: SpecialtyPatch,
    ) -> StoreResult<Option<Specialty>> {
        Ok(sqlx::query_as(
            "UPDATE specialties SET name = COALESCE($2, name), name_kg = COALESCE($3, name_kg), \
             description = COALESCE($4, description), \
             average_score = COALESCE($5, average_score), min_score = COALESCE($6, min_score), \
             max_score = COALESCE($7, max_score), duration = COALESCE($8, duration), \
             degree = COALESCE($9, degree), is_active = COALESCE($10, is_active), \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.name_kg)
        .bind(patch.description)
        .bind(patch.average_score)
        .bind(patch.min_score)
        .bind(patch.max_score)
        .bind(patch.duration)
        .bind(patch.degree)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_specialty(&self, id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM specialties WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn upsert_rankings(
        &self,
        month: i32,
        year: i32,
        kind: RankingKind,
        standings: &[Standing],
    ) -> StoreResult<Vec<MonthlyRanking>> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(standings.len());

        for standing in standings {
            let ranking = sqlx::query_as(
                "INSERT INTO monthly_rankings (id, user_id, month, year, rank, avg_score, \
                 total_tests, kind) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (user_id, month, year, kind) DO UPDATE SET rank = EXCLUDED.rank, \
                 avg_score = EXCLUDED.avg_score, total_tests = EXCLUDED.total_tests, \
                 updated_at = now() RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(standing.user_id)
            .bind(month)
            .bind(year)
            .bind(standing.rank)
            .bind(standing.avg_score)
            .bind(standing.total_tests)
            .bind(kind)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(ranking);
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn award_bonus(&self, ranking_id: Uuid, coins: i32) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let winner: Option<Uuid> = sqlx::query_scalar(
            "UPDATE monthly_rankings SET bonus_awarded = TRUE, updated_at = now() \
             WHERE id = $1 AND NOT bonus_awarded RETURNING user_id",
        )
        .bind(ranking_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = winner else {
            return Ok(false);
        };

        sqlx::query("UPDATE users SET coins = coins + $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(coins)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn rankings_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<MonthlyRanking>> {
        Ok(sqlx::query_as(
            "SELECT * FROM monthly_rankings WHERE user_id = $1 \
             ORDER BY year DESC, month DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn platform_counts(&self, now: DateTime<Utc>) -> StoreResult<PlatformCounts> {
        let (users, tests, results, active_subscriptions) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM tests), \
             (SELECT COUNT(*) FROM test_results), \
             (SELECT COUNT(*) FROM subscriptions WHERE status = 'active' AND end_date > $1)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(PlatformCounts {
            users,
            tests,
            results,
            active_subscriptions,
        })
    }
}

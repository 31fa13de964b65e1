//! # PostgreSQL
//!
//! System of record for every entity on the platform.
//!
//! ## Requirements
//!
//! - Relations between users, tests, questions and results
//! - Transactions for subscription purchases and ranking bonuses
//! - Unique phone numbers and referral codes enforced by the database
//!
//! ## Implementation
//!
//! - One small `sqlx` pool shared by every request, the only contended resource
//! - Schema lives in `migrations/` and is embedded into the binary
//! - Options and graded answers are stored as JSONB next to their owner row
use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

pub const MAX_CONNECTIONS: u32 = 5;
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn init_postgres(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

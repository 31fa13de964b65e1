//! # Question Bank
//!
//! Domain types and the pure logic behind the ORT platform.
//!
//! - [`models`]: records as stored in PostgreSQL and served as JSON
//! - [`scoring`]: grading a submitted attempt
//! - [`admission`]: admission chance from an ORT score
//! - [`ranking`]: averaging results into monthly and live leaderboards
//! - [`pdf`]: best-effort question extraction from PDF text
//! - [`rewards`]: coin amounts and referral discounts
//!
//! Nothing here touches the network or the database. The server and the jobs
//! CLI both call into this crate so that grading and ranking never diverge.
pub mod admission;
pub mod models;
pub mod pdf;
pub mod ranking;
pub mod rewards;
pub mod scoring;

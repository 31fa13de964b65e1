//! # Rankings
//!
//! Averages of result scores per user, ordered for leaderboards.
//!
//! Ordering is deterministic: higher average first, then more tests taken,
//! then the smaller user id. The monthly job and the live `/users/ranking`
//! board share [`average_by_user`] so both agree on who is ahead.
use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RankingKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAverage {
    pub user_id: Uuid,
    pub avg_score: f64,
    pub total_tests: i32,
}

/// One scored result as seen by the monthly job. `group` is the school or
/// region of the result's owner, depending on the ranking kind.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub user_id: Uuid,
    pub score: i32,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub user_id: Uuid,
    pub rank: i32,
    pub avg_score: f64,
    pub total_tests: i32,
}

fn leaderboard_order(a: &UserAverage, b: &UserAverage) -> Ordering {
    b.avg_score
        .partial_cmp(&a.avg_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.total_tests.cmp(&a.total_tests))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Groups `(user, score)` pairs by user and sorts them best first.
pub fn average_by_user<I>(scores: I) -> Vec<UserAverage>
where
    I: IntoIterator<Item = (Uuid, i32)>,
{
    let mut totals: HashMap<Uuid, (i64, i32)> = HashMap::new();
    for (user_id, score) in scores {
        let entry = totals.entry(user_id).or_default();
        entry.0 += score as i64;
        entry.1 += 1;
    }

    let mut averages: Vec<UserAverage> = totals
        .into_iter()
        .map(|(user_id, (sum, count))| UserAverage {
            user_id,
            avg_score: sum as f64 / count as f64,
            total_tests: count,
        })
        .collect();

    averages.sort_by(leaderboard_order);
    averages
}

fn rank(averages: Vec<UserAverage>) -> impl Iterator<Item = Standing> {
    averages
        .into_iter()
        .enumerate()
        .map(|(position, average)| Standing {
            user_id: average.user_id,
            rank: position as i32 + 1,
            avg_score: average.avg_score,
            total_tests: average.total_tests,
        })
}

/// Standings for one month of results.
///
/// Country rankings put everyone on one board. School and region rankings
/// restart at rank 1 inside every group, and results whose owner has no
/// group are left out.
pub fn monthly_standings(results: &[RankedResult], kind: RankingKind) -> Vec<Standing> {
    if kind == RankingKind::Country {
        return rank(average_by_user(results.iter().map(|r| (r.user_id, r.score)))).collect();
    }

    let mut groups: HashMap<&str, Vec<(Uuid, i32)>> = HashMap::new();
    for result in results {
        let Some(group) = result.group.as_deref().map(str::trim).filter(|g| !g.is_empty()) else {
            continue;
        };
        groups
            .entry(group)
            .or_default()
            .push((result.user_id, result.score));
    }

    let mut names: Vec<&str> = groups.keys().copied().collect();
    names.sort_unstable();

    names
        .into_iter()
        .flat_map(|name| rank(average_by_user(groups.remove(name).unwrap_or_default())))
        .collect()
}

/// 1 + the number of `others` averaging strictly better than `own`.
pub fn position_among(own: f64, others: &[UserAverage]) -> i32 {
    1 + others.iter().filter(|o| o.avg_score > own).count() as i32
}

/// The calendar month before `now`, as `(month, year)`.
pub fn previous_month(now: DateTime<Utc>) -> (u32, i32) {
    match now.month() {
        1 => (12, now.year() - 1),
        month => (month - 1, now.year()),
    }
}

/// Half-open `[start, end)` bounds of a calendar month in UTC.
pub fn month_bounds(month: u32, year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    Some((
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

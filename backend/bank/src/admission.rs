//! # Admission Chance
//!
//! Piecewise linear estimate of getting into a specialty given an ORT score.
//!
//! With user score `u`, specialty average `a` and minimum `m`:
//!
//! | band | chance | status |
//! |---|---|---|
//! | `u >= a` | 100 | high |
//! | `m <= u < a` | 50 to 100, linear | medium |
//! | `m - 20 <= u < m` | 0 to 50, linear | low |
//! | below | 0 | low |
//!
//! A missing minimum defaults to `a - 20`. A minimum above the average is
//! treated as the average, which keeps the curve non-decreasing.
use serde::{Deserialize, Serialize};

/// Width of the band below the minimum that still has a chance.
pub const LOW_BAND: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chance {
    pub chance: u8,
    pub status: Status,
}

pub fn admission_chance(user_score: f64, average_score: f64, min_score: Option<f64>) -> Chance {
    let average = average_score;
    let min = min_score.unwrap_or(average - LOW_BAND).min(average);

    if user_score >= average {
        return Chance {
            chance: 100,
            status: Status::High,
        };
    }

    let (raw, status) = if user_score >= min {
        // min < average here, since u < a and u >= m
        (50.0 + 50.0 * (user_score - min) / (average - min), Status::Medium)
    } else if user_score >= min - LOW_BAND {
        (50.0 * (user_score - (min - LOW_BAND)) / LOW_BAND, Status::Low)
    } else {
        (0.0, Status::Low)
    };

    Chance {
        chance: raw.round().clamp(0.0, 100.0) as u8,
        status,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_at_or_above_average_is_certain() {
        assert_eq!(admission_chance(180.0, 180.0, Some(150.0)).chance, 100);
        assert_eq!(admission_chance(250.0, 180.0, None).status, Status::High);
    }

    #[test]
    fn test_medium_band_interpolates() {
        let chance = admission_chance(165.0, 180.0, Some(150.0));
        assert_eq!(chance.chance, 75);
        assert_eq!(chance.status, Status::Medium);

        assert_eq!(admission_chance(150.0, 180.0, Some(150.0)).chance, 50);
    }

    #[test]
    fn test_low_band_interpolates() {
        let chance = admission_chance(140.0, 180.0, Some(150.0));
        assert_eq!(chance.chance, 25);
        assert_eq!(chance.status, Status::Low);

        assert_eq!(admission_chance(130.0, 180.0, Some(150.0)).chance, 0);
        assert_eq!(admission_chance(10.0, 180.0, Some(150.0)).chance, 0);
    }

    #[test]
    fn test_missing_minimum_defaults_below_average() {
        assert_eq!(admission_chance(170.0, 180.0, None).chance, 75);
        assert_eq!(admission_chance(150.0, 180.0, None).chance, 25);
    }

    #[test]
    fn test_minimum_above_average_is_clamped() {
        let chance = admission_chance(175.0, 180.0, Some(200.0));
        assert_eq!(chance.status, Status::Low);
        assert_eq!(chance.chance, 38);
    }

    proptest! {
        #[test]
        fn test_chance_is_bounded_and_monotonic(
            average in 0.0f64..300.0,
            min in proptest::option::of(0.0f64..300.0),
            a in 0.0f64..300.0,
            b in 0.0f64..300.0,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let low_chance = admission_chance(low, average, min);
            let high_chance = admission_chance(high, average, min);

            prop_assert!(low_chance.chance <= 100);
            prop_assert!(low_chance.chance <= high_chance.chance);
            if high >= average {
                prop_assert_eq!(high_chance.chance, 100);
            }
        }
    }
}

//! Coin and discount amounts.
use crate::models::RankingKind;

/// Credited to a referrer when a referred user buys their first subscription.
pub const REFERRAL_REWARD_COINS: i32 = 100;

/// Recorded on the referred user's first subscription.
pub const REFERRAL_DISCOUNT: f64 = 100.0;

/// Monthly first place bonus.
pub const FIRST_PLACE_BONUS_COINS: i32 = 1000;

pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;
pub const MAX_SUBSCRIPTION_DAYS: i64 = 366;

/// Only the country wide board pays out a bonus.
pub fn pays_first_place_bonus(kind: RankingKind) -> bool {
    kind == RankingKind::Country
}

/// Discount and referrer credit owed for a purchase. Nothing is owed unless
/// the buyer was referred and has never subscribed before.
pub fn referral_terms(referred: bool, previous_subscriptions: usize) -> Option<(f64, i32)> {
    (referred && previous_subscriptions == 0).then_some((REFERRAL_DISCOUNT, REFERRAL_REWARD_COINS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_terms_only_on_first_purchase() {
        assert_eq!(referral_terms(true, 0), Some((100.0, 100)));
        assert_eq!(referral_terms(true, 1), None);
        assert_eq!(referral_terms(false, 0), None);
    }

    #[test]
    fn test_bonus_only_for_country() {
        assert!(pays_first_place_bonus(RankingKind::Country));
        assert!(!pays_first_place_bonus(RankingKind::School));
        assert!(!pays_first_place_bonus(RankingKind::Region));
    }
}

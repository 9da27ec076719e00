use super::borrower::BorrowerId;
use super::money::Money;
use crate::error::{LendingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

/// A borrower's revolving credit limit for one tenor.
///
/// `current_limit` always stays within `0..=original_limit`; only [`adjust`]
/// moves it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct CreditLimit {
    pub borrower: BorrowerId,
    pub tenor: u32,
    pub current_limit: Money,
    pub original_limit: Money,
    pub updated_at: DateTime<Utc>,
}

impl CreditLimit {
    /// A fresh bucket with its full ceiling available.
    pub fn seeded(borrower: BorrowerId, tenor: u32, ceiling: Money, now: DateTime<Utc>) -> Self {
        Self {
            borrower,
            tenor,
            current_limit: ceiling,
            original_limit: ceiling,
            updated_at: now,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.current_limit <= self.original_limit
    }

    fn shifted(&self, delta: Money, direction: Direction, now: DateTime<Utc>) -> Self {
        let current_limit = match direction {
            Direction::Debit => self.current_limit.saturating_sub(delta),
            Direction::Credit => self.current_limit.capped_add(delta, self.original_limit),
        };
        Self {
            current_limit,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Computes the bucket set that results from moving `delta` on `tenor`.
///
/// Sufficiency is only checked against the bucket matching `tenor`, but the
/// same delta is then applied to every bucket the borrower owns, each clamped
/// to its own `0..=original_limit` range. The caller persists the returned
/// set in one bulk update and must already hold the borrower's limit lock.
pub fn adjust(
    borrower: BorrowerId,
    buckets: &[CreditLimit],
    tenor: u32,
    delta: Money,
    direction: Direction,
    now: DateTime<Utc>,
) -> Result<Vec<CreditLimit>> {
    let matching = buckets
        .iter()
        .find(|bucket| bucket.tenor == tenor)
        .ok_or(LendingError::TenorNotFound { borrower, tenor })?;

    if direction == Direction::Debit && matching.current_limit < delta {
        return Err(LendingError::OverLimit {
            tenor,
            available: matching.current_limit.value(),
            requested: delta.value(),
        });
    }

    Ok(buckets
        .iter()
        .map(|bucket| bucket.shifted(delta, direction, now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    fn bucket(tenor: u32, current: Decimal, original: Decimal) -> CreditLimit {
        CreditLimit {
            borrower: 7,
            tenor,
            current_limit: money(current),
            original_limit: money(original),
            updated_at: Utc::now(),
        }
    }

    fn by_tenor(buckets: &[CreditLimit], tenor: u32) -> &CreditLimit {
        buckets.iter().find(|b| b.tenor == tenor).unwrap()
    }

    #[test]
    fn test_debit_applies_to_every_bucket() {
        let buckets = vec![
            bucket(1, dec!(100000), dec!(100000)),
            bucket(3, dec!(500000), dec!(500000)),
            bucket(6, dec!(700000), dec!(700000)),
        ];

        let updated = adjust(7, &buckets, 3, money(dec!(250000)), Direction::Debit, Utc::now()).unwrap();

        assert_eq!(updated.len(), 3);
        assert_eq!(by_tenor(&updated, 3).current_limit, money(dec!(250000)));
        assert_eq!(by_tenor(&updated, 6).current_limit, money(dec!(450000)));
        // Smaller buckets clamp at zero instead of going negative.
        assert_eq!(by_tenor(&updated, 1).current_limit, Money::ZERO);
        assert!(updated.iter().all(CreditLimit::is_consistent));
    }

    #[test]
    fn test_debit_over_matching_bucket_is_rejected() {
        let buckets = vec![
            bucket(1, dec!(100000), dec!(100000)),
            bucket(6, dec!(700000), dec!(700000)),
        ];

        let result = adjust(7, &buckets, 1, money(dec!(100000.01)), Direction::Debit, Utc::now());

        assert!(matches!(
            result,
            Err(LendingError::OverLimit { tenor: 1, .. })
        ));
    }

    #[test]
    fn test_debit_of_exact_current_limit_is_allowed() {
        let buckets = vec![bucket(2, dec!(200000), dec!(200000))];

        let updated = adjust(7, &buckets, 2, money(dec!(200000)), Direction::Debit, Utc::now()).unwrap();

        assert_eq!(updated[0].current_limit, Money::ZERO);
    }

    #[test]
    fn test_missing_tenor_is_rejected_for_both_directions() {
        let buckets = vec![bucket(6, dec!(10), dec!(10))];

        for direction in [Direction::Debit, Direction::Credit] {
            let result = adjust(7, &buckets, 12, money(dec!(1)), direction, Utc::now());
            assert!(matches!(
                result,
                Err(LendingError::TenorNotFound { borrower: 7, tenor: 12 })
            ));
        }
    }

    #[test]
    fn test_no_buckets_means_tenor_not_found() {
        let result = adjust(7, &[], 1, money(dec!(1)), Direction::Debit, Utc::now());
        assert!(matches!(result, Err(LendingError::TenorNotFound { .. })));
    }

    #[test]
    fn test_credit_clamps_each_bucket_at_its_ceiling() {
        let buckets = vec![
            bucket(1, dec!(0), dec!(100000)),
            bucket(6, dec!(5000000), dec!(10000000)),
        ];

        let updated = adjust(7, &buckets, 6, money(dec!(5000000)), Direction::Credit, Utc::now()).unwrap();

        assert_eq!(by_tenor(&updated, 6).current_limit, money(dec!(10000000)));
        assert_eq!(by_tenor(&updated, 1).current_limit, money(dec!(100000)));
    }

    #[test]
    fn test_credit_does_not_check_sufficiency() {
        let buckets = vec![bucket(6, dec!(0), dec!(10))];

        let updated = adjust(7, &buckets, 6, money(dec!(1000)), Direction::Credit, Utc::now()).unwrap();

        assert_eq!(updated[0].current_limit, money(dec!(10)));
    }
}

//! Emission and fixed-point accumulator math.
//!
//! All intermediate products are computed in `u128` with checked operations;
//! results are truncated (floor division) exactly once, at the end of each
//! formula.

use crate::constants::{ACC_PRECISION, BPS_DENOMINATOR};
use crate::error::{Error, Result};

// ─── Emission multiplier ──────────────────────────────────────────────────────

/// Number of reward-weighted blocks between `from` and `to`.
///
/// Blocks up to and including `bonus_end_block` count `bonus_multiplier`
/// times, later blocks count once:
///
/// ```text
/// to <= bonus_end            (to - from) * bonus_multiplier
/// from >= bonus_end          (to - from)
/// otherwise                  (bonus_end - from) * bonus_multiplier + (to - bonus_end)
/// ```
///
/// The result is exact and additive over adjacent ranges.
pub fn block_reward_multiplier(
    from: u64,
    to: u64,
    bonus_end_block: u64,
    bonus_multiplier: u64,
) -> Result<u64> {
    if to < from {
        return Err(Error::InvalidParameter("multiplier range ends before it starts"));
    }
    if to <= bonus_end_block {
        (to - from)
            .checked_mul(bonus_multiplier)
            .ok_or(Error::MathOverflow)
    } else if from >= bonus_end_block {
        Ok(to - from)
    } else {
        (bonus_end_block - from)
            .checked_mul(bonus_multiplier)
            .and_then(|bonus| bonus.checked_add(to - bonus_end_block))
            .ok_or(Error::MathOverflow)
    }
}

// ─── Pool reward ──────────────────────────────────────────────────────────────

/// `multiplier * reward_per_block * alloc_point / total_alloc_point`.
///
/// A farm with no allocation at all emits nothing.
pub fn pool_reward(
    multiplier: u64,
    reward_per_block: u64,
    alloc_point: u64,
    total_alloc_point: u64,
) -> Result<u64> {
    if total_alloc_point == 0 {
        return Ok(0);
    }
    let reward = (multiplier as u128)
        .checked_mul(reward_per_block as u128)
        .and_then(|r| r.checked_mul(alloc_point as u128))
        .ok_or(Error::MathOverflow)?
        / total_alloc_point as u128;
    to_amount(reward)
}

// ─── Accumulators ─────────────────────────────────────────────────────────────

/// Per-share value of `reward` spread over `supply` staked units, scaled by
/// [`ACC_PRECISION`].
pub fn reward_per_share(reward: u64, supply: u64) -> Result<u128> {
    if supply == 0 {
        return Err(Error::InvalidParameter("reward spread over an empty pool"));
    }
    (reward as u128)
        .checked_mul(ACC_PRECISION)
        .map(|scaled| scaled / supply as u128)
        .ok_or(Error::MathOverflow)
}

/// `amount * acc / ACC_PRECISION`: what `amount` staked units have earned
/// against accumulator value `acc`. Same scale as a position debt.
pub fn accrued(amount: u64, acc: u128) -> Result<u128> {
    (amount as u128)
        .checked_mul(acc)
        .map(|scaled| scaled / ACC_PRECISION)
        .ok_or(Error::MathOverflow)
}

/// `amount * bps / 10_000`.
pub fn bps_of(amount: u64, bps: u64) -> Result<u64> {
    let portion = (amount as u128)
        .checked_mul(bps as u128)
        .ok_or(Error::MathOverflow)?
        / BPS_DENOMINATOR;
    to_amount(portion)
}

/// Narrow a `u128` intermediate back to a token amount.
pub fn to_amount(value: u128) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::MathOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn multiplier_cases() {
        // entirely inside the bonus window
        assert_eq!(block_reward_multiplier(10, 20, 50, 4).unwrap(), 40);
        // ending exactly on the boundary still counts as bonus
        assert_eq!(block_reward_multiplier(40, 50, 50, 4).unwrap(), 40);
        // entirely after
        assert_eq!(block_reward_multiplier(60, 70, 50, 4).unwrap(), 10);
        // straddling
        assert_eq!(block_reward_multiplier(45, 55, 50, 4).unwrap(), 5 * 4 + 5);
        // empty range
        assert_eq!(block_reward_multiplier(30, 30, 50, 4).unwrap(), 0);
    }

    #[test]
    fn multiplier_rejects_reversed_range() {
        assert!(matches!(
            block_reward_multiplier(20, 10, 0, 1),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn pool_reward_splits_by_weight() {
        // 10 blocks * 20 per block, full weight
        assert_eq!(pool_reward(10, 20, 300, 300).unwrap(), 200);
        // a third of the weight, truncated
        assert_eq!(pool_reward(10, 10, 1, 3).unwrap(), 33);
        assert_eq!(pool_reward(10, 20, 0, 0).unwrap(), 0);
    }

    #[test]
    fn accumulator_round_trip_is_floor() {
        let acc = reward_per_share(200, 1_000).unwrap();
        assert_eq!(acc, 200_000_000_000);
        assert_eq!(accrued(1_000, acc).unwrap(), 200);
        // 7 reward over 3 shares loses the remainder in the accumulator
        let acc = reward_per_share(7, 3).unwrap();
        assert_eq!(accrued(3, acc).unwrap(), 6);
    }

    #[test]
    fn bps_portion() {
        assert_eq!(bps_of(1_000, 7_000).unwrap(), 700);
        assert_eq!(bps_of(3, 5_000).unwrap(), 1);
        assert_eq!(bps_of(u64::MAX, 10_000).unwrap(), u64::MAX);
    }

    proptest! {
        #[test]
        fn multiplier_is_additive(
            a in 0u64..1_000_000,
            b in 0u64..1_000_000,
            c in 0u64..1_000_000,
            bonus_end in 0u64..1_000_000,
            bonus_multiplier in 0u64..1_000,
        ) {
            let mut points = [a, b, c];
            points.sort_unstable();
            let [from, mid, to] = points;
            let left = block_reward_multiplier(from, mid, bonus_end, bonus_multiplier).unwrap();
            let right = block_reward_multiplier(mid, to, bonus_end, bonus_multiplier).unwrap();
            let whole = block_reward_multiplier(from, to, bonus_end, bonus_multiplier).unwrap();
            prop_assert_eq!(left + right, whole);
        }

        #[test]
        fn multiplier_never_below_block_count_when_boosted(
            from in 0u64..1_000_000,
            len in 0u64..1_000_000,
            bonus_end in 0u64..2_000_000,
            bonus_multiplier in 1u64..1_000,
        ) {
            let m = block_reward_multiplier(from, from + len, bonus_end, bonus_multiplier).unwrap();
            prop_assert!(m >= len);
        }
    }
}

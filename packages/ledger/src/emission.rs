//! Reward emission: schedule parameters, pools and settlement.
//!
//! A pool keeps two monotone accumulators. `acc_reward_per_share` collects
//! every reward ever emitted per staked unit; `acc_reward_per_share_til_bonus_end`
//! collects only the part emitted up to the bonus end block. Settlement costs
//! the same no matter how many blocks have elapsed.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::constants::DEV_SHARE_DIVISOR;
use crate::error::{Error, Result};
use crate::math::{block_reward_multiplier, bps_of, pool_reward, reward_per_share};

/// Global emission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    /// Reward minted per block across all pools, before the bonus multiplier.
    pub reward_per_block: u64,
    /// Pools added earlier start accruing here.
    pub start_block: u64,
    pub bonus_multiplier: u64,
    pub bonus_end_block: u64,
    /// Share of bonus-window rewards that is locked instead of paid out.
    pub bonus_lock_up_bps: u64,
}

impl EmissionSchedule {
    pub fn validate(&self) -> Result<()> {
        validate_lock_up_bps(self.bonus_lock_up_bps)
    }

    pub fn multiplier(&self, from: u64, to: u64) -> Result<u64> {
        block_reward_multiplier(from, to, self.bonus_end_block, self.bonus_multiplier)
    }
}

pub(crate) fn validate_lock_up_bps(bps: u64) -> Result<()> {
    if bps > 10_000 {
        return Err(Error::InvalidParameter("bonus lock-up exceeds 10000 bps"));
    }
    Ok(())
}

// ─── Pool ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub stake_asset: Pubkey,
    /// Relative weight of this pool in the per-block emission.
    pub alloc_point: u64,
    pub last_reward_block: u64,
    /// Cumulative reward per staked unit, scaled by `ACC_PRECISION`.
    pub acc_reward_per_share: u128,
    /// Bonus-window part of `acc_reward_per_share`; frozen once the pool has
    /// settled past the bonus end block.
    pub acc_reward_per_share_til_bonus_end: u128,
}

/// Everything one settlement of a pool does, computed without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub from_block: u64,
    pub to_block: u64,
    /// Minted into farm custody for stakers.
    pub reward: u64,
    /// Minted to the dev account on top of `reward`.
    pub dev_reward: u64,
    /// Part of the dev account's balance to lock for the bonus window.
    pub dev_lock: u64,
    pub acc_reward_per_share: u128,
    pub acc_reward_per_share_til_bonus_end: u128,
}

impl Pool {
    pub fn new(stake_asset: Pubkey, alloc_point: u64, last_reward_block: u64) -> Self {
        Self {
            stake_asset,
            alloc_point,
            last_reward_block,
            acc_reward_per_share: 0,
            acc_reward_per_share_til_bonus_end: 0,
        }
    }

    /// What settling this pool at `block` would do, or `None` when the pool
    /// is already settled at or past `block`.
    ///
    /// `staked` is the stake-asset balance the farm holds for this pool. An
    /// empty pool only advances its reward block.
    pub fn settlement(
        &self,
        schedule: &EmissionSchedule,
        total_alloc_point: u64,
        staked: u64,
        block: u64,
    ) -> Result<Option<Settlement>> {
        if block <= self.last_reward_block {
            return Ok(None);
        }
        let mut settlement = Settlement {
            from_block: self.last_reward_block,
            to_block: block,
            reward: 0,
            dev_reward: 0,
            dev_lock: 0,
            acc_reward_per_share: self.acc_reward_per_share,
            acc_reward_per_share_til_bonus_end: self.acc_reward_per_share_til_bonus_end,
        };
        if staked == 0 {
            return Ok(Some(settlement));
        }

        let multiplier = schedule.multiplier(self.last_reward_block, block)?;
        let reward = pool_reward(
            multiplier,
            schedule.reward_per_block,
            self.alloc_point,
            total_alloc_point,
        )?;
        settlement.reward = reward;
        settlement.dev_reward = reward / DEV_SHARE_DIVISOR;
        settlement.acc_reward_per_share = self
            .acc_reward_per_share
            .checked_add(reward_per_share(reward, staked)?)
            .ok_or(Error::MathOverflow)?;

        if block <= schedule.bonus_end_block {
            // Whole interval inside the bonus window: both accumulators move together.
            settlement.dev_lock = bps_of(settlement.dev_reward, schedule.bonus_lock_up_bps)?;
            settlement.acc_reward_per_share_til_bonus_end = settlement.acc_reward_per_share;
        } else if self.last_reward_block < schedule.bonus_end_block {
            // First settlement across the boundary. The bonus slice is re-derived
            // with the bonus parameters in force now, not those in force while
            // the slice accrued.
            let bonus_blocks = schedule.bonus_end_block - self.last_reward_block;
            let bonus_multiplier = bonus_blocks
                .checked_mul(schedule.bonus_multiplier)
                .ok_or(Error::MathOverflow)?;
            let bonus_reward = pool_reward(
                bonus_multiplier,
                schedule.reward_per_block,
                self.alloc_point,
                total_alloc_point,
            )?;
            settlement.dev_lock = bps_of(
                bonus_reward / DEV_SHARE_DIVISOR,
                schedule.bonus_lock_up_bps,
            )?;
            settlement.acc_reward_per_share_til_bonus_end = self
                .acc_reward_per_share_til_bonus_end
                .checked_add(reward_per_share(bonus_reward, staked)?)
                .ok_or(Error::MathOverflow)?;
        }

        Ok(Some(settlement))
    }

    pub fn apply(&mut self, settlement: &Settlement) {
        self.last_reward_block = settlement.to_block;
        self.acc_reward_per_share = settlement.acc_reward_per_share;
        self.acc_reward_per_share_til_bonus_end = settlement.acc_reward_per_share_til_bonus_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACC_PRECISION;

    fn schedule(
        bonus_multiplier: u64,
        bonus_end_block: u64,
        bonus_lock_up_bps: u64,
    ) -> EmissionSchedule {
        EmissionSchedule {
            reward_per_block: 100,
            start_block: 0,
            bonus_multiplier,
            bonus_end_block,
            bonus_lock_up_bps,
        }
    }

    #[test]
    fn already_settled_pool_is_untouched() {
        let pool = Pool::new(Pubkey::new_unique(), 1, 50);
        let s = schedule(1, 0, 0);
        assert_eq!(pool.settlement(&s, 1, 1_000, 50).unwrap(), None);
        assert_eq!(pool.settlement(&s, 1, 1_000, 40).unwrap(), None);
    }

    #[test]
    fn empty_pool_only_advances() {
        let pool = Pool::new(Pubkey::new_unique(), 1, 50);
        let settlement = pool.settlement(&schedule(1, 0, 0), 1, 0, 80).unwrap().unwrap();
        assert_eq!(settlement.reward, 0);
        assert_eq!(settlement.to_block, 80);
        assert_eq!(settlement.acc_reward_per_share, 0);
    }

    #[test]
    fn inside_bonus_window_accumulators_match() {
        let mut pool = Pool::new(Pubkey::new_unique(), 1, 0);
        let s = schedule(4, 100, 7_000);
        let settlement = pool.settlement(&s, 1, 1_000, 10).unwrap().unwrap();
        // 10 blocks * 4x * 100
        assert_eq!(settlement.reward, 4_000);
        assert_eq!(settlement.dev_reward, 400);
        assert_eq!(settlement.dev_lock, 280);
        assert_eq!(settlement.acc_reward_per_share, 4 * ACC_PRECISION);
        assert_eq!(
            settlement.acc_reward_per_share_til_bonus_end,
            settlement.acc_reward_per_share
        );
        pool.apply(&settlement);
        assert_eq!(pool.last_reward_block, 10);
    }

    #[test]
    fn straddling_settlement_splits_bonus_slice() {
        let pool = Pool::new(Pubkey::new_unique(), 1, 90);
        let s = schedule(4, 100, 5_000);
        let settlement = pool.settlement(&s, 1, 1_000, 110).unwrap().unwrap();
        // 10 bonus blocks * 4 + 10 normal blocks, * 100
        assert_eq!(settlement.reward, 5_000);
        assert_eq!(settlement.dev_reward, 500);
        // dev lock only covers the 4_000 bonus slice
        assert_eq!(settlement.dev_lock, 200);
        assert_eq!(settlement.acc_reward_per_share, 5 * ACC_PRECISION);
        assert_eq!(settlement.acc_reward_per_share_til_bonus_end, 4 * ACC_PRECISION);
    }

    #[test]
    fn bonus_accumulator_frozen_after_boundary() {
        let mut pool = Pool::new(Pubkey::new_unique(), 1, 90);
        let s = schedule(4, 100, 5_000);
        let first = pool.settlement(&s, 1, 1_000, 110).unwrap().unwrap();
        pool.apply(&first);
        let second = pool.settlement(&s, 1, 1_000, 130).unwrap().unwrap();
        assert_eq!(second.reward, 2_000);
        assert_eq!(second.dev_lock, 0);
        assert_eq!(
            second.acc_reward_per_share_til_bonus_end,
            first.acc_reward_per_share_til_bonus_end
        );
        assert!(second.acc_reward_per_share > first.acc_reward_per_share);
    }

    #[test]
    fn lock_up_bps_is_bounded() {
        assert!(schedule(2, 10, 10_000).validate().is_ok());
        assert!(matches!(
            schedule(2, 10, 10_001).validate(),
            Err(Error::InvalidParameter(_))
        ));
    }
}

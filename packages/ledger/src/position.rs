use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::emission::Pool;
use crate::error::{Error, Result};
use crate::math::{accrued, to_amount};

// ─── Position ──────────────────────────────────────────────────────────────
// One account's stake in one pool.
// Debts are accumulator snapshots taken at the last sync; only what the
// accumulators gained since then is owed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub amount: u64,
    /// `amount * acc_reward_per_share / ACC_PRECISION` at last sync
    pub reward_debt: u128,
    /// `amount * acc_reward_per_share_til_bonus_end / ACC_PRECISION` at last sync
    pub bonus_debt: u128,
    /// Account that supplied the principal; only it may add or withdraw.
    pub funded_by: Option<Pubkey>,
}

impl Position {
    /// Reward earned since the last sync against accumulator `acc`.
    pub fn pending_reward(&self, acc_reward_per_share: u128) -> Result<u64> {
        let earned = accrued(self.amount, acc_reward_per_share)?;
        to_amount(
            earned
                .checked_sub(self.reward_debt)
                .ok_or(Error::MathOverflow)?,
        )
    }

    /// Bonus-window share of the reward earned since the last sync.
    pub fn pending_bonus(&self, acc_reward_per_share_til_bonus_end: u128) -> Result<u64> {
        let earned = accrued(self.amount, acc_reward_per_share_til_bonus_end)?;
        to_amount(
            earned
                .checked_sub(self.bonus_debt)
                .ok_or(Error::MathOverflow)?,
        )
    }

    /// Snapshot both accumulators for the current amount.
    pub fn sync_debts(&mut self, pool: &Pool) -> Result<()> {
        self.reward_debt = accrued(self.amount, pool.acc_reward_per_share)?;
        self.bonus_debt = accrued(self.amount, pool.acc_reward_per_share_til_bonus_end)?;
        Ok(())
    }

    pub fn is_funded_by(&self, caller: &Pubkey) -> bool {
        self.funded_by.as_ref() == Some(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACC_PRECISION;

    #[test]
    fn pending_is_growth_since_sync() {
        let mut pool = Pool::new(Pubkey::new_unique(), 1, 0);
        pool.acc_reward_per_share = 2 * ACC_PRECISION;
        pool.acc_reward_per_share_til_bonus_end = ACC_PRECISION;

        let mut position = Position {
            amount: 10,
            ..Position::default()
        };
        position.sync_debts(&pool).unwrap();
        assert_eq!(position.reward_debt, 20);
        assert_eq!(position.bonus_debt, 10);
        assert_eq!(position.pending_reward(pool.acc_reward_per_share).unwrap(), 0);

        pool.acc_reward_per_share += ACC_PRECISION / 2;
        assert_eq!(position.pending_reward(pool.acc_reward_per_share).unwrap(), 5);
        assert_eq!(
            position
                .pending_bonus(pool.acc_reward_per_share_til_bonus_end)
                .unwrap(),
            0
        );
    }

    #[test]
    fn funder_check() {
        let funder = Pubkey::new_unique();
        let position = Position {
            funded_by: Some(funder),
            ..Position::default()
        };
        assert!(position.is_funded_by(&funder));
        assert!(!position.is_funded_by(&Pubkey::new_unique()));
        assert!(!Position::default().is_funded_by(&funder));
    }
}

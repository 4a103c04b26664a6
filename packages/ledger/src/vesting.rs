//! Linear release of locked balances.
//!
//! Locked tokens are released over a global block window
//! `[start_block, end_block]`. Each account carries an unlock cursor; an
//! unlock releases the fraction of the *remaining* lock that corresponds to
//! the blocks elapsed since the cursor, then moves the cursor to the current
//! block. Repeated partial unlocks therefore never overshoot, and everything
//! left is released once the window has ended.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Global block range over which locked balances are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseWindow {
    pub start_block: u64,
    pub end_block: u64,
}

impl ReleaseWindow {
    pub fn new(start_block: u64, end_block: u64) -> Result<Self> {
        let window = Self { start_block, end_block };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_block <= self.start_block {
            return Err(Error::InvalidParameter(
                "release window end must be after its start",
            ));
        }
        Ok(())
    }
}

/// One account's locked balance and unlock cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub locked: u64,
    pub last_unlock_block: u64,
}

impl LockRecord {
    /// Amount an unlock at `block` would release.
    pub fn unlockable(&self, window: &ReleaseWindow, block: u64) -> u64 {
        if block < window.start_block {
            0
        } else if block >= window.end_block {
            self.locked
        } else {
            let elapsed = block.saturating_sub(self.last_unlock_block) as u128;
            let remaining = window.end_block.saturating_sub(self.last_unlock_block) as u128;
            if remaining == 0 {
                return self.locked;
            }
            // elapsed <= remaining, so the quotient never exceeds `locked`
            (self.locked as u128 * elapsed / remaining) as u64
        }
    }
}

/// Lock table for every account, plus the running total of locked tokens.
#[derive(Debug, Clone)]
pub struct VestingLedger {
    window: ReleaseWindow,
    locks: HashMap<Pubkey, LockRecord>,
    total_locked: u64,
}

impl VestingLedger {
    pub fn new(window: ReleaseWindow) -> Result<Self> {
        window.validate()?;
        Ok(Self {
            window,
            locks: HashMap::new(),
            total_locked: 0,
        })
    }

    pub fn window(&self) -> ReleaseWindow {
        self.window
    }

    pub fn record(&self, account: &Pubkey) -> LockRecord {
        self.locks.get(account).copied().unwrap_or_default()
    }

    pub fn lock_of(&self, account: &Pubkey) -> u64 {
        self.record(account).locked
    }

    pub fn last_unlock_block(&self, account: &Pubkey) -> u64 {
        self.record(account).last_unlock_block
    }

    pub fn total_locked(&self) -> u64 {
        self.total_locked
    }

    pub fn can_unlock_amount(&self, account: &Pubkey, block: u64) -> u64 {
        self.record(account).unlockable(&self.window, block)
    }

    /// Add `amount` to the account's lock.
    ///
    /// A cursor that predates the window start is raised to it, so a fresh
    /// lock never releases anything for blocks before the window opened.
    pub fn lock(&mut self, account: &Pubkey, amount: u64) -> Result<()> {
        let total_locked = self
            .total_locked
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        let mut record = self.record(account);
        record.locked = record.locked.checked_add(amount).ok_or(Error::MathOverflow)?;
        record.last_unlock_block = record.last_unlock_block.max(self.window.start_block);

        self.total_locked = total_locked;
        self.store(account, record);
        Ok(())
    }

    /// Release what is unlockable at `block` and advance the cursor.
    ///
    /// Returns the released amount, which may be zero before the window opens.
    pub fn release(&mut self, account: &Pubkey, block: u64) -> Result<u64> {
        let mut record = self.record(account);
        if record.locked == 0 {
            return Err(Error::NothingLocked);
        }
        let amount = record.unlockable(&self.window, block);
        record.locked -= amount;
        // The cursor only moves forward; an unlock before the window opens
        // leaves it at the window start.
        record.last_unlock_block = record.last_unlock_block.max(block);

        self.total_locked -= amount;
        self.store(account, record);
        Ok(amount)
    }

    /// Move `from`'s entire lock onto `to`.
    ///
    /// The merged lock keeps the later of the two cursors, never earlier than
    /// the window start. Returns the amount moved.
    pub fn merge(&mut self, from: &Pubkey, to: &Pubkey) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let source = self.record(from);
        let mut target = self.record(to);
        target.locked = target
            .locked
            .checked_add(source.locked)
            .ok_or(Error::MathOverflow)?;
        target.last_unlock_block = target
            .last_unlock_block
            .max(self.window.start_block)
            .max(source.last_unlock_block);

        self.locks.remove(from);
        self.store(to, target);
        Ok(source.locked)
    }

    fn store(&mut self, account: &Pubkey, record: LockRecord) {
        if record.locked == 0 {
            self.locks.remove(account);
        } else {
            self.locks.insert(*account, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ledger(start: u64, end: u64) -> VestingLedger {
        VestingLedger::new(ReleaseWindow::new(start, end).unwrap()).unwrap()
    }

    #[test]
    fn window_must_be_non_empty() {
        assert!(matches!(
            ReleaseWindow::new(100, 100),
            Err(Error::InvalidParameter(_))
        ));
        assert!(ReleaseWindow::new(100, 50).is_err());
    }

    #[test]
    fn releases_fraction_of_remainder() {
        let alice = Pubkey::new_unique();
        let mut vesting = ledger(0, 100);
        vesting.lock(&alice, 1_000).unwrap();

        assert_eq!(vesting.can_unlock_amount(&alice, 50), 500);
        assert_eq!(vesting.release(&alice, 50).unwrap(), 500);
        assert_eq!(vesting.lock_of(&alice), 500);
        assert_eq!(vesting.last_unlock_block(&alice), 50);

        assert_eq!(vesting.can_unlock_amount(&alice, 75), 250);
        assert_eq!(vesting.release(&alice, 75).unwrap(), 250);
        assert_eq!(vesting.total_locked(), 250);
    }

    #[test]
    fn nothing_before_window_everything_after() {
        let alice = Pubkey::new_unique();
        let mut vesting = ledger(100, 200);
        vesting.lock(&alice, 900).unwrap();
        assert_eq!(vesting.last_unlock_block(&alice), 100);

        assert_eq!(vesting.can_unlock_amount(&alice, 99), 0);
        assert_eq!(vesting.release(&alice, 99).unwrap(), 0);
        // an early unlock does not pull the cursor below the window start
        assert_eq!(vesting.last_unlock_block(&alice), 100);

        assert_eq!(vesting.can_unlock_amount(&alice, 200), 900);
        assert_eq!(vesting.release(&alice, 250).unwrap(), 900);
        assert_eq!(vesting.record(&alice), LockRecord::default());
        assert_eq!(vesting.release(&alice, 260), Err(Error::NothingLocked));
    }

    #[test]
    fn later_lock_keeps_cursor() {
        let alice = Pubkey::new_unique();
        let mut vesting = ledger(0, 100);
        vesting.lock(&alice, 100).unwrap();
        vesting.release(&alice, 40).unwrap();
        vesting.lock(&alice, 40).unwrap();
        assert_eq!(vesting.last_unlock_block(&alice), 40);
        assert_eq!(vesting.lock_of(&alice), 100);
    }

    #[test]
    fn merge_takes_later_cursor() {
        let (alice, bob) = (Pubkey::new_unique(), Pubkey::new_unique());
        let mut vesting = ledger(10, 110);
        vesting.lock(&alice, 600).unwrap();
        vesting.release(&alice, 60).unwrap();
        vesting.lock(&bob, 100).unwrap();

        let moved = vesting.merge(&alice, &bob).unwrap();
        assert_eq!(moved, 300);
        assert_eq!(vesting.lock_of(&alice), 0);
        assert_eq!(vesting.lock_of(&bob), 400);
        assert_eq!(vesting.last_unlock_block(&bob), 60);
        assert_eq!(vesting.total_locked(), 400);
    }

    #[test]
    fn merge_into_fresh_account_clamps_to_window_start() {
        let (alice, bob) = (Pubkey::new_unique(), Pubkey::new_unique());
        let mut vesting = ledger(10, 110);
        vesting.lock(&alice, 50).unwrap();
        vesting.merge(&alice, &bob).unwrap();
        assert_eq!(vesting.last_unlock_block(&bob), 10);
    }

    proptest! {
        #[test]
        fn unlockable_is_monotone_and_exact_at_end(
            locked in 0u64..u64::MAX / 2,
            start in 0u64..10_000,
            len in 1u64..10_000,
            cursor_offset in 0u64..10_000,
            b1 in 0u64..30_000,
            b2 in 0u64..30_000,
        ) {
            let window = ReleaseWindow::new(start, start + len).unwrap();
            let record = LockRecord {
                locked,
                last_unlock_block: start + cursor_offset % len,
            };
            let (lo, hi) = if b1 <= b2 { (b1, b2) } else { (b2, b1) };
            prop_assert!(record.unlockable(&window, lo) <= record.unlockable(&window, hi));
            prop_assert!(record.unlockable(&window, hi) <= locked);
            prop_assert_eq!(record.unlockable(&window, start + len), locked);
        }

        #[test]
        fn repeated_unlocks_converge(
            locked in 1u64..1_000_000_000,
            mut blocks in proptest::collection::vec(0u64..1_000, 0..16),
        ) {
            let alice = Pubkey::new_unique();
            let mut vesting = ledger(100, 900);
            vesting.lock(&alice, locked).unwrap();
            blocks.sort_unstable();

            let mut released = 0u64;
            for block in blocks {
                if vesting.lock_of(&alice) == 0 {
                    break;
                }
                released += vesting.release(&alice, block).unwrap();
                prop_assert!(released <= locked);
            }
            if vesting.lock_of(&alice) > 0 {
                released += vesting.release(&alice, 900).unwrap();
            }
            prop_assert_eq!(released, locked);
            prop_assert_eq!(vesting.total_locked(), 0);
        }
    }
}

//! Stake-asset custody.
//!
//! The farm never tracks stake balances itself: it asks a [`StakeBank`] how
//! much of an asset its custody address holds and moves principal in and out
//! through it.

use std::collections::HashMap;

use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Transferable multi-asset balances.
pub trait StakeBank {
    fn balance_of(&self, asset: &Pubkey, owner: &Pubkey) -> u64;

    /// Move `amount` of `asset` from `from` to `to`, all or nothing.
    fn transfer(&mut self, asset: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()>;
}

/// In-memory [`StakeBank`] keyed by `(asset, owner)`.
#[derive(Debug, Clone, Default)]
pub struct AssetBank {
    balances: HashMap<(Pubkey, Pubkey), u64>,
}

impl AssetBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `owner` with freshly issued `amount` of `asset`.
    pub fn credit(&mut self, asset: &Pubkey, owner: &Pubkey, amount: u64) -> Result<()> {
        let balance = self.balances.entry((*asset, *owner)).or_default();
        *balance = balance.checked_add(amount).ok_or(Error::MathOverflow)?;
        Ok(())
    }
}

impl StakeBank for AssetBank {
    fn balance_of(&self, asset: &Pubkey, owner: &Pubkey) -> u64 {
        self.balances.get(&(*asset, *owner)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, asset: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let available = self.balance_of(asset, from);
        if amount > available {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        self.balances.insert((*asset, *from), available - amount);
        self.balances.insert((*asset, *to), credited);
        Ok(())
    }
}

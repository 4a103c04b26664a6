//! Reward / governance token.
//!
//! A capped, controller-minted balance table that carries the two ledgers
//! hanging off token balances:
//!
//! * the [`VestingLedger`]: locked tokens sit in the token's own custody
//!   address and are released linearly;
//! * the [`CheckpointIndex`]: every balance movement moves the delegated
//!   votes of the sender's delegate to the recipient's delegate.
//!
//! Votes follow free balances only. Locked tokens vote again once unlocked.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use tracing::{debug, info};

use crate::access::Controller;
use crate::checkpoints::{checkpoint_block, Checkpoint, CheckpointIndex};
use crate::context::Context;
use crate::delegation::{self, DelegationSignature};
use crate::error::{Error, Result};
use crate::vesting::{ReleaseWindow, VestingLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    /// Custody address holding locked balances.
    pub address: Pubkey,
    /// Maximum total supply.
    pub cap: u64,
    /// Portion of the cap the controller may mint outside of emission.
    pub manual_mint_limit: u64,
    pub release: ReleaseWindow,
}

#[derive(Debug, Clone)]
pub struct RewardToken {
    name: String,
    address: Pubkey,
    controller: Controller,
    cap: u64,
    total_supply: u64,
    manual_mint_limit: u64,
    manual_minted: u64,
    balances: HashMap<Pubkey, u64>,
    delegates: HashMap<Pubkey, Pubkey>,
    nonces: HashMap<Pubkey, u64>,
    vesting: VestingLedger,
    votes: CheckpointIndex,
}

impl RewardToken {
    pub fn new(config: TokenConfig, owner: Pubkey) -> Result<Self> {
        if config.manual_mint_limit > config.cap {
            return Err(Error::InvalidParameter("manual mint limit exceeds the cap"));
        }
        Ok(Self {
            name: config.name,
            address: config.address,
            controller: Controller::new(owner),
            cap: config.cap,
            total_supply: 0,
            manual_mint_limit: config.manual_mint_limit,
            manual_minted: 0,
            balances: HashMap::new(),
            delegates: HashMap::new(),
            nonces: HashMap::new(),
            vesting: VestingLedger::new(config.release)?,
            votes: CheckpointIndex::new(),
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn owner(&self) -> Pubkey {
        self.controller.owner()
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn manual_minted(&self) -> u64 {
        self.manual_minted
    }

    /// Supply that can still be minted under the cap.
    pub fn mint_headroom(&self) -> u64 {
        self.cap - self.total_supply
    }

    /// Free (unlocked) balance.
    pub fn balance_of(&self, account: &Pubkey) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Free plus locked balance.
    pub fn total_balance_of(&self, account: &Pubkey) -> u64 {
        self.balance_of(account)
            .saturating_add(self.vesting.lock_of(account))
    }

    pub fn lock_of(&self, account: &Pubkey) -> u64 {
        self.vesting.lock_of(account)
    }

    pub fn last_unlock_block(&self, account: &Pubkey) -> u64 {
        self.vesting.last_unlock_block(account)
    }

    pub fn total_lock(&self) -> u64 {
        self.vesting.total_locked()
    }

    pub fn release_window(&self) -> ReleaseWindow {
        self.vesting.window()
    }

    pub fn can_unlock_amount(&self, account: &Pubkey, block: u64) -> u64 {
        self.vesting.can_unlock_amount(account, block)
    }

    pub fn delegates(&self, account: &Pubkey) -> Option<Pubkey> {
        self.delegates.get(account).copied()
    }

    pub fn nonce(&self, account: &Pubkey) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn current_votes(&self, account: &Pubkey) -> u64 {
        self.votes.current_votes(account)
    }

    pub fn prior_votes(
        &self,
        account: &Pubkey,
        block_number: u64,
        current_block: u64,
    ) -> Result<u64> {
        self.votes.prior_votes(account, block_number, current_block)
    }

    pub fn checkpoint_count(&self, account: &Pubkey) -> usize {
        self.votes.checkpoint_count(account)
    }

    pub fn checkpoint(&self, account: &Pubkey, index: usize) -> Option<Checkpoint> {
        self.votes.checkpoint(account, index)
    }

    pub fn domain_separator(&self) -> Hash {
        delegation::domain_separator(&self.name, &self.address)
    }

    pub fn delegation_digest(&self, delegatee: &Pubkey, nonce: u64, expiry: i64) -> Hash {
        delegation::delegation_digest(&self.domain_separator(), delegatee, nonce, expiry)
    }

    // ── Controller operations ─────────────────────────────────────────────────

    pub fn transfer_ownership(&mut self, ctx: &Context, new_owner: Pubkey) -> Result<()> {
        self.controller.transfer(&ctx.caller, new_owner)
    }

    pub fn mint(&mut self, ctx: &Context, to: &Pubkey, amount: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        self.issue(to, amount, ctx.block)
    }

    /// Mint outside of emission, bounded by the manual mint limit.
    pub fn manual_mint(&mut self, ctx: &Context, to: &Pubkey, amount: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        let headroom = self.manual_mint_limit - self.manual_minted;
        if amount > headroom {
            return Err(Error::ManualMintLimitExceeded {
                requested: amount,
                headroom,
            });
        }
        self.issue(to, amount, ctx.block)?;
        self.manual_minted += amount;
        Ok(())
    }

    pub fn burn(&mut self, ctx: &Context, account: &Pubkey, amount: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        self.move_balance(Some(account), None, amount, ctx.block)?;
        self.total_supply -= amount;
        info!(%account, amount, "burned");
        Ok(())
    }

    /// Move `amount` of `account`'s free balance into vesting custody.
    pub fn lock(&mut self, ctx: &Context, account: &Pubkey, amount: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        if *account == self.address {
            return Err(Error::InvalidParameter("custody address cannot hold a lock"));
        }
        let custody = self.address;
        self.move_balance(Some(account), Some(&custody), amount, ctx.block)?;
        self.vesting.lock(account, amount)?;
        debug!(%account, amount, "locked");
        Ok(())
    }

    // ── Holder operations ─────────────────────────────────────────────────────

    pub fn transfer(&mut self, ctx: &Context, to: &Pubkey, amount: u64) -> Result<()> {
        self.move_balance(Some(&ctx.caller), Some(to), amount, ctx.block)
    }

    /// Release what the caller's lock allows at the current block.
    pub fn unlock(&mut self, ctx: &Context) -> Result<u64> {
        let account = ctx.caller;
        if self.vesting.lock_of(&account) == 0 {
            return Err(Error::NothingLocked);
        }
        let amount = self.vesting.can_unlock_amount(&account, ctx.block);
        let custody = self.address;
        self.move_balance(Some(&custody), Some(&account), amount, ctx.block)?;
        self.vesting.release(&account, ctx.block)?;
        info!(%account, amount, block = ctx.block, "unlocked");
        Ok(amount)
    }

    /// Hand the caller's whole position (free balance and lock) to `to`.
    pub fn transfer_all(&mut self, ctx: &Context, to: &Pubkey) -> Result<()> {
        let from = ctx.caller;
        if from == *to {
            return Ok(());
        }
        if *to == self.address {
            return Err(Error::InvalidParameter("custody address cannot hold a lock"));
        }
        let balance = self.balance_of(&from);
        self.move_balance(Some(&from), Some(to), balance, ctx.block)?;
        let locked = self.vesting.merge(&from, to)?;
        info!(%from, %to, balance, locked, "transferred all");
        Ok(())
    }

    pub fn delegate(&mut self, ctx: &Context, delegatee: Pubkey) -> Result<()> {
        self.delegate_from(ctx.caller, delegatee, ctx.block)
    }

    /// Apply a delegation the holder signed off-line.
    pub fn delegate_by_sig(
        &mut self,
        ctx: &Context,
        delegatee: Pubkey,
        nonce: u64,
        expiry: i64,
        signed: &DelegationSignature,
    ) -> Result<()> {
        let digest = self.delegation_digest(&delegatee, nonce, expiry);
        let signer = delegation::recover_signer(&digest, signed).ok_or(Error::InvalidSignature)?;
        let expected = self.nonce(&signer);
        if nonce != expected {
            return Err(Error::InvalidNonce {
                expected,
                got: nonce,
            });
        }
        if ctx.unix_timestamp > expiry {
            return Err(Error::SignatureExpired {
                expiry,
                now: ctx.unix_timestamp,
            });
        }
        self.delegate_from(signer, delegatee, ctx.block)?;
        self.nonces.insert(signer, expected + 1);
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Fail the way a balance movement touching `accounts` at `block` would
    /// fail to checkpoint its votes, without writing anything.
    pub(crate) fn ensure_checkpointable(&self, accounts: &[Pubkey], block: u64) -> Result<()> {
        for account in accounts {
            if let Some(delegate) = self.delegates(account) {
                self.votes
                    .ensure_appendable(&delegate, checkpoint_block(block)?)?;
            }
        }
        Ok(())
    }

    fn issue(&mut self, to: &Pubkey, amount: u64, block: u64) -> Result<()> {
        let headroom = self.mint_headroom();
        if amount > headroom {
            return Err(Error::CapExceeded {
                requested: amount,
                headroom,
            });
        }
        self.move_balance(None, Some(to), amount, block)?;
        self.total_supply += amount;
        debug!(%to, amount, total_supply = self.total_supply, "minted");
        Ok(())
    }

    fn delegate_from(&mut self, delegator: Pubkey, delegatee: Pubkey, block: u64) -> Result<()> {
        if delegator == self.address {
            return Err(Error::InvalidParameter("custody address cannot delegate"));
        }
        let current = self.delegates(&delegator);
        let balance = self.balance_of(&delegator);
        self.votes
            .move_votes(current.as_ref(), Some(&delegatee), balance, block)?;
        self.delegates.insert(delegator, delegatee);
        info!(%delegator, %delegatee, balance, "delegate changed");
        Ok(())
    }

    /// Move free balance and the matching delegated votes. `None` on the
    /// sending side mints, `None` on the receiving side burns.
    ///
    /// Every check runs before the first write.
    fn move_balance(
        &mut self,
        from: Option<&Pubkey>,
        to: Option<&Pubkey>,
        amount: u64,
        block: u64,
    ) -> Result<()> {
        let debited = match from {
            Some(account) => {
                let available = self.balance_of(account);
                if amount > available {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available,
                    });
                }
                Some((account, available - amount))
            }
            None => None,
        };
        if from.is_some() && from == to {
            return Ok(());
        }
        let credited = match to {
            Some(account) => Some((
                account,
                self.balance_of(account)
                    .checked_add(amount)
                    .ok_or(Error::MathOverflow)?,
            )),
            None => None,
        };

        let src_delegate = from.and_then(|account| self.delegates(account));
        let dst_delegate = to.and_then(|account| self.delegates(account));
        self.votes
            .move_votes(src_delegate.as_ref(), dst_delegate.as_ref(), amount, block)?;

        if let Some((account, balance)) = debited {
            self.balances.insert(*account, balance);
        }
        if let Some((account, balance)) = credited {
            self.balances.insert(*account, balance);
        }
        Ok(())
    }
}

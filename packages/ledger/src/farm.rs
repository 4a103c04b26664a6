//! The farm: pool registry, settlement and staking positions.
//!
//! A [`Farm`] owns every registry the ledger has: the pools, the
//! `(pool, account)` positions, the [`RewardToken`] (and with it the lock and
//! checkpoint tables) and the stake-asset bank. It is the controller of the
//! reward token, so settlement mints through it and harvests lock through it.
//!
//! Every user-facing operation settles the pool it touches before reading or
//! writing a position. Operations are planned against the current state and
//! only applied once every check has passed, so a rejected call leaves the
//! farm as it was.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::access::Controller;
use crate::bank::{AssetBank, StakeBank};
use crate::context::Context;
use crate::emission::{validate_lock_up_bps, EmissionSchedule, Pool, Settlement};
use crate::error::{Error, Result};
use crate::math::bps_of;
use crate::position::Position;
use crate::token::RewardToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Custody address for stake assets and undistributed reward.
    pub address: Pubkey,
    pub owner: Pubkey,
    /// Receives the dev share of every settlement.
    pub dev: Pubkey,
    pub emission: EmissionSchedule,
}

/// What one harvest paid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Harvest {
    /// Reward transferred to the recipient.
    pub reward: u64,
    /// Part of `reward` moved straight into the recipient's lock.
    pub bonus_locked: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawal {
    pub principal: u64,
    /// Reward the position gave up; zero when it could not be computed.
    pub forfeited_reward: u64,
}

#[derive(Debug, Clone)]
pub struct Farm<B = AssetBank> {
    address: Pubkey,
    controller: Controller,
    dev: Pubkey,
    emission: EmissionSchedule,
    total_alloc_point: u64,
    pools: Vec<Pool>,
    positions: HashMap<(usize, Pubkey), Position>,
    token: RewardToken,
    bank: B,
}

impl<B: StakeBank> Farm<B> {
    pub fn new(config: FarmConfig, token: RewardToken, bank: B) -> Result<Self> {
        config.emission.validate()?;
        if token.owner() != config.address {
            return Err(Error::InvalidParameter(
                "reward token must be controlled by the farm",
            ));
        }
        validate_dev(&config.dev, &config.address, &token)?;
        Ok(Self {
            address: config.address,
            controller: Controller::new(config.owner),
            dev: config.dev,
            emission: config.emission,
            total_alloc_point: 0,
            pools: Vec::new(),
            positions: HashMap::new(),
            token,
            bank,
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn owner(&self) -> Pubkey {
        self.controller.owner()
    }

    pub fn dev(&self) -> Pubkey {
        self.dev
    }

    pub fn emission(&self) -> &EmissionSchedule {
        &self.emission
    }

    pub fn config(&self) -> FarmConfig {
        FarmConfig {
            address: self.address,
            owner: self.owner(),
            dev: self.dev,
            emission: self.emission,
        }
    }

    pub fn total_alloc_point(&self) -> u64 {
        self.total_alloc_point
    }

    pub fn pool_length(&self) -> usize {
        self.pools.len()
    }

    pub fn pool(&self, pid: usize) -> Option<&Pool> {
        self.pools.get(pid)
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// The position, or an empty one if the account never staked in `pid`.
    pub fn position(&self, pid: usize, account: &Pubkey) -> Position {
        self.positions
            .get(&(pid, *account))
            .copied()
            .unwrap_or_default()
    }

    pub fn positions(&self) -> impl Iterator<Item = (&(usize, Pubkey), &Position)> {
        self.positions.iter()
    }

    /// Stake-asset balance the farm holds for `pid`.
    pub fn staked_supply(&self, pid: usize) -> Result<u64> {
        let pool = self.pool_ref(pid)?;
        Ok(self.bank.balance_of(&pool.stake_asset, &self.address))
    }

    /// Reward `account` would receive from harvesting `pid` at `block`.
    pub fn pending_reward(&self, pid: usize, account: &Pubkey, block: u64) -> Result<u64> {
        let pool = *self.pool_ref(pid)?;
        let staked = self.bank.balance_of(&pool.stake_asset, &self.address);
        let acc_reward_per_share = match pool.settlement(
            &self.emission,
            self.total_alloc_point,
            staked,
            block,
        )? {
            Some(settlement) => settlement.acc_reward_per_share,
            None => pool.acc_reward_per_share,
        };
        self.position(pid, account)
            .pending_reward(acc_reward_per_share)
    }

    pub fn token(&self) -> &RewardToken {
        &self.token
    }

    /// Holder-side token operations (transfer, unlock, delegate, ...).
    pub fn token_mut(&mut self) -> &mut RewardToken {
        &mut self.token
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    // ── Administration ────────────────────────────────────────────────────────

    pub fn transfer_ownership(&mut self, ctx: &Context, new_owner: Pubkey) -> Result<()> {
        self.controller.transfer(&ctx.caller, new_owner)
    }

    /// Register a new pool and return its id.
    pub fn add_pool(
        &mut self,
        ctx: &Context,
        alloc_point: u64,
        stake_asset: Pubkey,
        with_update: bool,
    ) -> Result<usize> {
        self.controller.ensure_owner(&ctx.caller)?;
        if stake_asset == Pubkey::default() {
            return Err(Error::InvalidParameter("stake asset must be set"));
        }
        if self.pools.iter().any(|pool| pool.stake_asset == stake_asset) {
            return Err(Error::DuplicatePool(stake_asset));
        }
        let total_alloc_point = self
            .total_alloc_point
            .checked_add(alloc_point)
            .ok_or(Error::MathOverflow)?;
        if with_update {
            self.settle_all(ctx.block)?;
        }
        self.total_alloc_point = total_alloc_point;
        let last_reward_block = ctx.block.max(self.emission.start_block);
        self.pools
            .push(Pool::new(stake_asset, alloc_point, last_reward_block));
        let pid = self.pools.len() - 1;
        info!(pid, %stake_asset, alloc_point, last_reward_block, "pool added");
        Ok(pid)
    }

    pub fn set_pool(
        &mut self,
        ctx: &Context,
        pid: usize,
        alloc_point: u64,
        with_update: bool,
    ) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        let previous = self.pool_ref(pid)?.alloc_point;
        let total_alloc_point = (self.total_alloc_point - previous)
            .checked_add(alloc_point)
            .ok_or(Error::MathOverflow)?;
        if with_update {
            self.settle_all(ctx.block)?;
        }
        self.total_alloc_point = total_alloc_point;
        self.pools[pid].alloc_point = alloc_point;
        info!(pid, previous, alloc_point, "pool weight changed");
        Ok(())
    }

    /// Takes effect for blocks not yet settled; pools are not settled first.
    pub fn set_reward_per_block(&mut self, ctx: &Context, reward_per_block: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        info!(
            previous = self.emission.reward_per_block,
            reward_per_block, "emission rate changed"
        );
        self.emission.reward_per_block = reward_per_block;
        Ok(())
    }

    pub fn set_bonus(
        &mut self,
        ctx: &Context,
        bonus_multiplier: u64,
        bonus_end_block: u64,
        bonus_lock_up_bps: u64,
    ) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        if bonus_end_block <= ctx.block {
            return Err(Error::InvalidParameter("bonus end block must be in the future"));
        }
        if bonus_multiplier <= 1 {
            return Err(Error::InvalidParameter("bonus multiplier must exceed 1"));
        }
        validate_lock_up_bps(bonus_lock_up_bps)?;
        self.emission.bonus_multiplier = bonus_multiplier;
        self.emission.bonus_end_block = bonus_end_block;
        self.emission.bonus_lock_up_bps = bonus_lock_up_bps;
        info!(bonus_multiplier, bonus_end_block, bonus_lock_up_bps, "bonus window set");
        Ok(())
    }

    /// Hand the dev role on. Only the current dev account may do this.
    pub fn set_dev(&mut self, ctx: &Context, new_dev: Pubkey) -> Result<()> {
        if ctx.caller != self.dev {
            return Err(Error::Unauthorized("caller is not the dev account"));
        }
        validate_dev(&new_dev, &self.address, &self.token)?;
        info!(previous = %self.dev, dev = %new_dev, "dev account changed");
        self.dev = new_dev;
        Ok(())
    }

    pub fn manual_mint(&mut self, ctx: &Context, to: &Pubkey, amount: u64) -> Result<()> {
        self.controller.ensure_owner(&ctx.caller)?;
        let custody = self.custody_context(ctx.block);
        self.token.manual_mint(&custody, to, amount)?;
        info!(%to, amount, "manual mint");
        Ok(())
    }

    // ── Settlement ────────────────────────────────────────────────────────────

    pub fn update_pool(&mut self, ctx: &Context, pid: usize) -> Result<()> {
        self.pool_ref(pid)?;
        let plan = self.plan_settlements([pid], ctx.block)?;
        self.apply_settlements(&plan, ctx.block)
    }

    pub fn mass_update_pools(&mut self, ctx: &Context) -> Result<()> {
        self.settle_all(ctx.block)
    }

    // ── Positions ─────────────────────────────────────────────────────────────
    //
    // Each operation plans its settlement and payout, then moves the stake
    // asset, then applies the plan. Planning checks everything the apply step
    // could trip over, so a rejected operation writes nothing.

    /// Stake `amount` of the pool's asset from the caller into `for_account`'s
    /// position. An existing stake is harvested to `for_account` first.
    pub fn deposit(
        &mut self,
        ctx: &Context,
        for_account: Pubkey,
        pid: usize,
        amount: u64,
    ) -> Result<Harvest> {
        self.pool_ref(pid)?;
        let mut position = self.position(pid, &for_account);
        if matches!(position.funded_by, Some(funder) if funder != ctx.caller) {
            return Err(Error::Unauthorized("position is funded by another account"));
        }
        let plan = self.plan_settlements([pid], ctx.block)?;
        let had_stake = position.amount > 0;
        let harvest = if had_stake {
            self.plan_harvest(pid, &position, &for_account, &plan, ctx.block)?
        } else {
            Harvest::default()
        };
        let pool = self.settled_pool(pid, &plan);
        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        position.funded_by = Some(ctx.caller);
        position.sync_debts(&pool)?;

        let address = self.address;
        self.bank
            .transfer(&pool.stake_asset, &ctx.caller, &address, amount)?;
        self.apply_settlements(&plan, ctx.block)?;
        if had_stake {
            self.pay(pid, &for_account, harvest, ctx.block)?;
        }
        self.positions.insert((pid, for_account), position);
        info!(pid, %for_account, funder = %ctx.caller, amount, "deposit");
        Ok(harvest)
    }

    /// Return `amount` of principal to the funder, harvesting to
    /// `for_account` first.
    pub fn withdraw(
        &mut self,
        ctx: &Context,
        for_account: Pubkey,
        pid: usize,
        amount: u64,
    ) -> Result<Harvest> {
        self.pool_ref(pid)?;
        self.exit(ctx, for_account, pid, Some(amount))
    }

    pub fn withdraw_all(
        &mut self,
        ctx: &Context,
        for_account: Pubkey,
        pid: usize,
    ) -> Result<Harvest> {
        self.pool_ref(pid)?;
        self.exit(ctx, for_account, pid, None)
    }

    /// Pay the caller's own pending reward in `pid`.
    pub fn harvest(&mut self, ctx: &Context, pid: usize) -> Result<Harvest> {
        self.pool_ref(pid)?;
        let mut position = self.position(pid, &ctx.caller);
        if position.amount == 0 {
            return Err(Error::NothingToHarvest { pid });
        }
        let plan = self.plan_settlements([pid], ctx.block)?;
        let harvest = self.plan_harvest(pid, &position, &ctx.caller, &plan, ctx.block)?;
        position.sync_debts(&self.settled_pool(pid, &plan))?;

        self.apply_settlements(&plan, ctx.block)?;
        self.pay(pid, &ctx.caller, harvest, ctx.block)?;
        self.positions.insert((pid, ctx.caller), position);
        Ok(harvest)
    }

    /// Return the whole principal without touching the reward path.
    ///
    /// The pool is not settled and nothing is paid; unharvested reward is
    /// forfeited.
    pub fn emergency_withdraw(
        &mut self,
        ctx: &Context,
        for_account: Pubkey,
        pid: usize,
    ) -> Result<EmergencyWithdrawal> {
        self.pool_ref(pid)?;
        let position = self.position(pid, &for_account);
        if !position.is_funded_by(&ctx.caller) {
            return Err(Error::Unauthorized("only the funder can withdraw"));
        }
        let forfeited_reward = match self.pending_reward(pid, &for_account, ctx.block) {
            Ok(pending) => pending,
            Err(err) => {
                warn!(pid, %for_account, error = %err, "forfeited reward unknown, reporting 0");
                0
            }
        };
        let asset = self.pools[pid].stake_asset;
        let address = self.address;
        self.bank
            .transfer(&asset, &address, &ctx.caller, position.amount)?;
        self.positions
            .insert((pid, for_account), Position::default());
        warn!(
            pid,
            %for_account,
            principal = position.amount,
            forfeited_reward,
            "emergency withdrawal"
        );
        Ok(EmergencyWithdrawal {
            principal: position.amount,
            forfeited_reward,
        })
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn pool_ref(&self, pid: usize) -> Result<&Pool> {
        self.pools.get(pid).ok_or(Error::PoolNotFound(pid))
    }

    /// The farm acting on its own token.
    fn custody_context(&self, block: u64) -> Context {
        Context::new(self.address, block)
    }

    fn ensure_controls_token(&self) -> Result<()> {
        if self.token.owner() != self.address {
            return Err(Error::Unauthorized("caller is not the controller"));
        }
        Ok(())
    }

    fn settle_all(&mut self, block: u64) -> Result<()> {
        let plan = self.plan_settlements(0..self.pools.len(), block)?;
        self.apply_settlements(&plan, block)
    }

    /// Settlements the pools in `pids` need at `block`.
    ///
    /// Fails if minting them would break the cap or the vote checkpoints; a
    /// plan that comes back `Ok` applies cleanly.
    fn plan_settlements(
        &self,
        pids: impl IntoIterator<Item = usize>,
        block: u64,
    ) -> Result<Vec<(usize, Settlement)>> {
        let mut plan = Vec::new();
        let mut minted = 0u64;
        for pid in pids {
            let pool = self.pool_ref(pid)?;
            let staked = self.bank.balance_of(&pool.stake_asset, &self.address);
            if let Some(settlement) =
                pool.settlement(&self.emission, self.total_alloc_point, staked, block)?
            {
                minted = minted
                    .checked_add(settlement.reward)
                    .and_then(|m| m.checked_add(settlement.dev_reward))
                    .ok_or(Error::MathOverflow)?;
                plan.push((pid, settlement));
            }
        }
        if minted > 0 {
            self.ensure_controls_token()?;
            let headroom = self.token.mint_headroom();
            if minted > headroom {
                return Err(Error::CapExceeded {
                    requested: minted,
                    headroom,
                });
            }
            self.token
                .ensure_checkpointable(&[self.dev, self.address], block)?;
        }
        Ok(plan)
    }

    /// `pid` as it will look once `plan` is applied.
    fn settled_pool(&self, pid: usize, plan: &[(usize, Settlement)]) -> Pool {
        let mut pool = self.pools[pid];
        for (_, settlement) in plan.iter().filter(|(planned, _)| *planned == pid) {
            pool.apply(settlement);
        }
        pool
    }

    /// What harvesting `position` pays `account` once `plan` is applied.
    fn plan_harvest(
        &self,
        pid: usize,
        position: &Position,
        account: &Pubkey,
        plan: &[(usize, Settlement)],
        block: u64,
    ) -> Result<Harvest> {
        let pool = self.settled_pool(pid, plan);
        let pending = position.pending_reward(pool.acc_reward_per_share)?;
        let incoming = plan
            .iter()
            .fold(0u64, |sum, (_, settlement)| sum.saturating_add(settlement.reward));
        let custody_balance = self.token.balance_of(&self.address).saturating_add(incoming);
        if pending > custody_balance {
            warn!(pid, %account, pending, custody_balance, "pending reward exceeds custody");
            return Err(Error::RewardExceedsCustody {
                pending,
                custody: custody_balance,
            });
        }
        let bonus = position.pending_bonus(pool.acc_reward_per_share_til_bonus_end)?;
        // rounding can leave the bonus slice a unit above what was paid
        let bonus_locked = bps_of(bonus, self.emission.bonus_lock_up_bps)?.min(pending);
        if bonus_locked > 0 {
            self.ensure_controls_token()?;
            if *account == self.token.address() {
                return Err(Error::InvalidParameter("custody address cannot hold a lock"));
            }
        }
        if pending > 0 {
            self.token
                .ensure_checkpointable(&[self.address, *account], block)?;
        }
        Ok(Harvest {
            reward: pending,
            bonus_locked,
        })
    }

    /// Mint and record a plan from [`Self::plan_settlements`].
    fn apply_settlements(&mut self, plan: &[(usize, Settlement)], block: u64) -> Result<()> {
        let custody = self.custody_context(block);
        let (dev, address) = (self.dev, self.address);
        for (pid, settlement) in plan {
            if settlement.dev_reward > 0 {
                self.token.mint(&custody, &dev, settlement.dev_reward)?;
            }
            if settlement.reward > 0 {
                self.token.mint(&custody, &address, settlement.reward)?;
            }
            if settlement.dev_lock > 0 {
                self.token.lock(&custody, &dev, settlement.dev_lock)?;
            }
            self.pools[*pid].apply(settlement);

            debug!(
                pid,
                from = settlement.from_block,
                to = settlement.to_block,
                reward = settlement.reward,
                dev_reward = settlement.dev_reward,
                dev_lock = settlement.dev_lock,
                acc = %settlement.acc_reward_per_share,
                acc_til_bonus_end = %settlement.acc_reward_per_share_til_bonus_end,
                "pool settled"
            );
        }
        Ok(())
    }

    /// Transfer a planned harvest out of custody and lock its bonus share.
    fn pay(&mut self, pid: usize, account: &Pubkey, harvest: Harvest, block: u64) -> Result<()> {
        let custody = self.custody_context(block);
        if harvest.reward > 0 {
            self.token.transfer(&custody, account, harvest.reward)?;
        }
        if harvest.bonus_locked > 0 {
            self.token.lock(&custody, account, harvest.bonus_locked)?;
        }
        info!(
            pid,
            %account,
            reward = harvest.reward,
            bonus_locked = harvest.bonus_locked,
            "harvest"
        );
        Ok(())
    }

    fn exit(
        &mut self,
        ctx: &Context,
        for_account: Pubkey,
        pid: usize,
        amount: Option<u64>,
    ) -> Result<Harvest> {
        let mut position = self.position(pid, &for_account);
        if !position.is_funded_by(&ctx.caller) {
            return Err(Error::Unauthorized("only the funder can withdraw"));
        }
        let amount = amount.unwrap_or(position.amount);
        if amount > position.amount {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: position.amount,
            });
        }
        let plan = self.plan_settlements([pid], ctx.block)?;
        let harvest = self.plan_harvest(pid, &position, &for_account, &plan, ctx.block)?;
        let pool = self.settled_pool(pid, &plan);
        position.amount -= amount;
        position.sync_debts(&pool)?;
        if position.amount == 0 {
            position.funded_by = None;
        }

        let address = self.address;
        self.bank
            .transfer(&pool.stake_asset, &address, &ctx.caller, amount)?;
        self.apply_settlements(&plan, ctx.block)?;
        self.pay(pid, &for_account, harvest, ctx.block)?;
        self.positions.insert((pid, for_account), position);
        info!(pid, %for_account, funder = %ctx.caller, amount, "withdraw");
        Ok(harvest)
    }
}

fn validate_dev(dev: &Pubkey, farm: &Pubkey, token: &RewardToken) -> Result<()> {
    if *dev == Pubkey::default() || dev == farm || *dev == token.address() {
        return Err(Error::InvalidParameter(
            "dev account must be a regular account",
        ));
    }
    Ok(())
}

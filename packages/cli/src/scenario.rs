//! JSON scenario files: a farm and token configuration plus an ordered list of
//! steps, replayed against the in-memory ledger.
//!
//! Accounts and assets are named by label. Each label maps to a keypair
//! derived from `sha256(label)`, so the same file always yields the same keys
//! and delegation signatures can be produced during the replay.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _, Result};
use furrow_ledger::{
    delegation, AssetBank, Context, EmissionSchedule, Farm, FarmConfig, ReleaseWindow,
    RewardToken, TokenConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{
    hash::hash,
    pubkey::Pubkey,
    signature::{keypair_from_seed, Keypair, Signer},
};
use tracing::{debug, warn};

/// Label of the farm's custody address.
pub const FARM_LABEL: &str = "farm";
/// Label of the token's vesting custody address.
pub const TOKEN_LABEL: &str = "token";

// ─── File format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub farm: FarmSection,
    pub token: TokenSection,
    /// Stake-asset balances credited before the first step.
    #[serde(default)]
    pub balances: Vec<InitialBalance>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FarmSection {
    pub owner: String,
    pub dev: String,
    pub emission: EmissionSchedule,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSection {
    #[serde(default = "default_token_name")]
    pub name: String,
    pub cap: u64,
    #[serde(default)]
    pub manual_mint_limit: u64,
    pub release: ReleaseWindow,
}

fn default_token_name() -> String {
    "Furrow".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialBalance {
    pub account: String,
    pub asset: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub block: u64,
    pub caller: String,
    /// Wall-clock seconds; only delegation expiry looks at it.
    #[serde(default)]
    pub timestamp: i64,
    pub action: Action,
}

/// One ledger operation. `for_account` defaults to the caller.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    AddPool {
        alloc_point: u64,
        asset: String,
        #[serde(default)]
        with_update: bool,
    },
    SetPool {
        pid: usize,
        alloc_point: u64,
        #[serde(default)]
        with_update: bool,
    },
    SetRewardPerBlock {
        reward_per_block: u64,
    },
    SetBonus {
        multiplier: u64,
        end_block: u64,
        lock_up_bps: u64,
    },
    SetDev {
        dev: String,
    },
    ManualMint {
        to: String,
        amount: u64,
    },
    TransferOwnership {
        new_owner: String,
    },
    UpdatePool {
        pid: usize,
    },
    MassUpdatePools,
    Deposit {
        pid: usize,
        amount: u64,
        #[serde(default)]
        for_account: Option<String>,
    },
    Withdraw {
        pid: usize,
        amount: u64,
        #[serde(default)]
        for_account: Option<String>,
    },
    WithdrawAll {
        pid: usize,
        #[serde(default)]
        for_account: Option<String>,
    },
    Harvest {
        pid: usize,
    },
    EmergencyWithdraw {
        pid: usize,
        #[serde(default)]
        for_account: Option<String>,
    },
    Transfer {
        to: String,
        amount: u64,
    },
    Unlock,
    TransferAll {
        to: String,
    },
    Delegate {
        delegatee: String,
    },
    /// Signed by the caller's derived key; `nonce` defaults to the current one.
    DelegateBySig {
        delegatee: String,
        expiry: i64,
        #[serde(default)]
        nonce: Option<u64>,
    },
    PendingReward {
        pid: usize,
        account: String,
    },
    PriorVotes {
        account: String,
        block_number: u64,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddPool { .. } => "add_pool",
            Action::SetPool { .. } => "set_pool",
            Action::SetRewardPerBlock { .. } => "set_reward_per_block",
            Action::SetBonus { .. } => "set_bonus",
            Action::SetDev { .. } => "set_dev",
            Action::ManualMint { .. } => "manual_mint",
            Action::TransferOwnership { .. } => "transfer_ownership",
            Action::UpdatePool { .. } => "update_pool",
            Action::MassUpdatePools => "mass_update_pools",
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::WithdrawAll { .. } => "withdraw_all",
            Action::Harvest { .. } => "harvest",
            Action::EmergencyWithdraw { .. } => "emergency_withdraw",
            Action::Transfer { .. } => "transfer",
            Action::Unlock => "unlock",
            Action::TransferAll { .. } => "transfer_all",
            Action::Delegate { .. } => "delegate",
            Action::DelegateBySig { .. } => "delegate_by_sig",
            Action::PendingReward { .. } => "pending_reward",
            Action::PriorVotes { .. } => "prior_votes",
        }
    }
}

// ─── Labels ───────────────────────────────────────────────────────────────────

/// Deterministic label → keypair registry.
#[derive(Default)]
pub struct Labels {
    keys: BTreeMap<String, Keypair>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keypair(&mut self, label: &str) -> Result<&Keypair> {
        if !self.keys.contains_key(label) {
            let seed = hash(label.as_bytes()).to_bytes();
            let keypair = keypair_from_seed(&seed)
                .map_err(|e| anyhow!("Cannot derive a key for label '{label}': {e}"))?;
            debug!(label, key = %keypair.pubkey(), "label registered");
            self.keys.insert(label.to_string(), keypair);
        }
        self.keys
            .get(label)
            .ok_or_else(|| anyhow!("Label '{label}' vanished from the registry"))
    }

    pub fn resolve(&mut self, label: &str) -> Result<Pubkey> {
        Ok(self.keypair(label)?.pubkey())
    }

    /// Reverse lookup; unknown keys print as base-58.
    pub fn name_of(&self, key: &Pubkey) -> String {
        self.iter()
            .find(|(_, pubkey)| pubkey == key)
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| key.to_string())
    }

    /// Every registered label with its key, sorted by label.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Pubkey)> {
        self.keys
            .iter()
            .map(|(label, keypair)| (label.as_str(), keypair.pubkey()))
    }
}

// ─── Replay ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub step: usize,
    pub block: u64,
    pub caller: String,
    pub action: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Ok { value: Value },
    Error { kind: String, message: String },
}

pub struct Replay {
    pub farm: Farm,
    pub outcomes: Vec<Outcome>,
}

pub fn parse(source: &str) -> Result<Scenario> {
    serde_json::from_str(source).context("Scenario is not valid JSON for this format")
}

/// Build the farm, token and stake balances the scenario starts from.
pub fn build(scenario: &Scenario, labels: &mut Labels) -> Result<Farm> {
    let farm_address = labels.resolve(FARM_LABEL)?;
    let token = RewardToken::new(
        TokenConfig {
            name: scenario.token.name.clone(),
            address: labels.resolve(TOKEN_LABEL)?,
            cap: scenario.token.cap,
            manual_mint_limit: scenario.token.manual_mint_limit,
            release: scenario.token.release,
        },
        farm_address,
    )
    .context("Invalid token section")?;

    let mut bank = AssetBank::new();
    for balance in &scenario.balances {
        let asset = labels.resolve(&balance.asset)?;
        let account = labels.resolve(&balance.account)?;
        bank.credit(&asset, &account, balance.amount)
            .with_context(|| format!("Cannot credit {} {}", balance.account, balance.asset))?;
    }

    let config = FarmConfig {
        address: farm_address,
        owner: labels.resolve(&scenario.farm.owner)?,
        dev: labels.resolve(&scenario.farm.dev)?,
        emission: scenario.farm.emission,
    };
    Farm::new(config, token, bank).context("Invalid farm section")
}

/// Run every step in order. A rejected step is recorded and leaves the
/// ledger unchanged; only malformed input aborts the replay.
pub fn replay(scenario: &Scenario, labels: &mut Labels) -> Result<Replay> {
    let mut farm = build(scenario, labels)?;
    let mut outcomes = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let caller = labels.resolve(&step.caller)?;
        let ctx = Context::new(caller, step.block).with_timestamp(step.timestamp);
        let result = match apply(&mut farm, labels, &ctx, &step.caller, &step.action)
            .with_context(|| format!("Step {index} ({})", step.action.name()))?
        {
            Ok(value) => StepResult::Ok { value },
            Err(err) => {
                warn!(step = index, action = step.action.name(), %err, "step rejected");
                StepResult::Error {
                    kind: format!("{:?}", err.kind()),
                    message: err.to_string(),
                }
            }
        };
        outcomes.push(Outcome {
            step: index,
            block: step.block,
            caller: step.caller.clone(),
            action: step.action.name(),
            result,
        });
    }
    Ok(Replay { farm, outcomes })
}

/// The outer error is a scenario problem, the inner one a ledger rejection.
fn apply(
    farm: &mut Farm,
    labels: &mut Labels,
    ctx: &Context,
    caller: &str,
    action: &Action,
) -> Result<furrow_ledger::Result<Value>> {
    let outcome = match action {
        Action::AddPool { alloc_point, asset, with_update } => {
            let asset = labels.resolve(asset)?;
            farm.add_pool(ctx, *alloc_point, asset, *with_update)
                .map(|pid| json!({ "pid": pid }))
        }
        Action::SetPool { pid, alloc_point, with_update } => farm
            .set_pool(ctx, *pid, *alloc_point, *with_update)
            .map(|()| Value::Null),
        Action::SetRewardPerBlock { reward_per_block } => farm
            .set_reward_per_block(ctx, *reward_per_block)
            .map(|()| Value::Null),
        Action::SetBonus { multiplier, end_block, lock_up_bps } => farm
            .set_bonus(ctx, *multiplier, *end_block, *lock_up_bps)
            .map(|()| Value::Null),
        Action::SetDev { dev } => {
            let dev = labels.resolve(dev)?;
            farm.set_dev(ctx, dev).map(|()| Value::Null)
        }
        Action::ManualMint { to, amount } => {
            let to = labels.resolve(to)?;
            farm.manual_mint(ctx, &to, *amount).map(|()| Value::Null)
        }
        Action::TransferOwnership { new_owner } => {
            let new_owner = labels.resolve(new_owner)?;
            farm.transfer_ownership(ctx, new_owner).map(|()| Value::Null)
        }
        Action::UpdatePool { pid } => farm.update_pool(ctx, *pid).map(|()| Value::Null),
        Action::MassUpdatePools => farm.mass_update_pools(ctx).map(|()| Value::Null),
        Action::Deposit { pid, amount, for_account } => {
            let account = beneficiary(labels, for_account.as_deref(), ctx)?;
            farm.deposit(ctx, account, *pid, *amount).map(|h| json!(h))
        }
        Action::Withdraw { pid, amount, for_account } => {
            let account = beneficiary(labels, for_account.as_deref(), ctx)?;
            farm.withdraw(ctx, account, *pid, *amount).map(|h| json!(h))
        }
        Action::WithdrawAll { pid, for_account } => {
            let account = beneficiary(labels, for_account.as_deref(), ctx)?;
            farm.withdraw_all(ctx, account, *pid).map(|h| json!(h))
        }
        Action::Harvest { pid } => farm.harvest(ctx, *pid).map(|h| json!(h)),
        Action::EmergencyWithdraw { pid, for_account } => {
            let account = beneficiary(labels, for_account.as_deref(), ctx)?;
            farm.emergency_withdraw(ctx, account, *pid).map(|w| json!(w))
        }
        Action::Transfer { to, amount } => {
            let to = labels.resolve(to)?;
            farm.token_mut().transfer(ctx, &to, *amount).map(|()| Value::Null)
        }
        Action::Unlock => farm
            .token_mut()
            .unlock(ctx)
            .map(|amount| json!({ "unlocked": amount })),
        Action::TransferAll { to } => {
            let to = labels.resolve(to)?;
            farm.token_mut().transfer_all(ctx, &to).map(|()| Value::Null)
        }
        Action::Delegate { delegatee } => {
            let delegatee = labels.resolve(delegatee)?;
            farm.token_mut().delegate(ctx, delegatee).map(|()| Value::Null)
        }
        Action::DelegateBySig { delegatee, expiry, nonce } => {
            let delegatee = labels.resolve(delegatee)?;
            let signer = labels.keypair(caller)?;
            let nonce = nonce.unwrap_or_else(|| farm.token().nonce(&signer.pubkey()));
            let domain = farm.token().domain_separator();
            let signed = delegation::sign_delegation(signer, &domain, &delegatee, nonce, *expiry);
            farm.token_mut()
                .delegate_by_sig(ctx, delegatee, nonce, *expiry, &signed)
                .map(|()| json!({ "nonce": nonce }))
        }
        Action::PendingReward { pid, account } => {
            let account = labels.resolve(account)?;
            farm.pending_reward(*pid, &account, ctx.block)
                .map(|pending| json!({ "pending": pending }))
        }
        Action::PriorVotes { account, block_number } => {
            let account = labels.resolve(account)?;
            farm.token()
                .prior_votes(&account, *block_number, ctx.block)
                .map(|votes| json!({ "votes": votes }))
        }
    };
    Ok(outcome)
}

fn beneficiary(labels: &mut Labels, for_account: Option<&str>, ctx: &Context) -> Result<Pubkey> {
    match for_account {
        Some(label) => labels.resolve(label),
        None => Ok(ctx.caller),
    }
}

// ─── Summary ──────────────────────────────────────────────────────────────────

/// End-of-replay state: pools, positions and per-label token balances.
pub fn summary(farm: &Farm, labels: &Labels) -> Value {
    let pools: Vec<Value> = farm
        .pools()
        .iter()
        .enumerate()
        .map(|(pid, pool)| {
            json!({
                "pid": pid,
                "stake_asset": labels.name_of(&pool.stake_asset),
                "alloc_point": pool.alloc_point,
                "last_reward_block": pool.last_reward_block,
                "acc_reward_per_share": pool.acc_reward_per_share.to_string(),
                "acc_reward_per_share_til_bonus_end":
                    pool.acc_reward_per_share_til_bonus_end.to_string(),
                "staked": farm.staked_supply(pid).unwrap_or(0),
            })
        })
        .collect();

    let mut positions: Vec<(usize, String, Value)> = farm
        .positions()
        .filter(|(_, position)| position.amount > 0)
        .map(|((pid, account), position)| {
            let name = labels.name_of(account);
            let value = json!({
                "pid": pid,
                "account": name,
                "amount": position.amount,
                "funded_by": position.funded_by.map(|funder| labels.name_of(&funder)),
            });
            (*pid, name, value)
        })
        .collect();
    positions.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    let token = farm.token();
    let accounts: Vec<Value> = labels
        .iter()
        .filter_map(|(label, key)| {
            let free = token.balance_of(&key);
            let locked = token.lock_of(&key);
            let votes = token.current_votes(&key);
            if free == 0 && locked == 0 && votes == 0 {
                return None;
            }
            Some(json!({
                "account": label,
                "free": free,
                "locked": locked,
                "votes": votes,
                "delegate": token.delegates(&key).map(|d| labels.name_of(&d)),
            }))
        })
        .collect();

    json!({
        "pools": pools,
        "positions": positions.into_iter().map(|(_, _, v)| v).collect::<Vec<_>>(),
        "token": {
            "total_supply": token.total_supply(),
            "total_lock": token.total_lock(),
            "manual_minted": token.manual_minted(),
        },
        "accounts": accounts,
    })
}

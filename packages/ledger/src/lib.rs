//! Furrow ledger
//!
//! Block-driven emission farm with a bonus window, linear vesting of locked
//! rewards and delegated vote checkpoints. Everything is in-memory state
//! advanced by explicit [`Context`] values, so a host can replay, simulate or
//! embed it.
//!
//! # Quick Start
//!
//! ```rust
//! use furrow_ledger::{
//!     AssetBank, Context, EmissionSchedule, Farm, FarmConfig, ReleaseWindow, RewardToken,
//!     TokenConfig,
//! };
//! use solana_sdk::pubkey::Pubkey;
//!
//! # fn main() -> furrow_ledger::Result<()> {
//! let (farm_address, owner, dev, alice, lp) = (
//!     Pubkey::new_unique(),
//!     Pubkey::new_unique(),
//!     Pubkey::new_unique(),
//!     Pubkey::new_unique(),
//!     Pubkey::new_unique(),
//! );
//! let token = RewardToken::new(
//!     TokenConfig {
//!         name: "Furrow".into(),
//!         address: Pubkey::new_unique(),
//!         cap: 1_000_000,
//!         manual_mint_limit: 0,
//!         release: ReleaseWindow::new(0, 100)?,
//!     },
//!     farm_address,
//! )?;
//! let mut bank = AssetBank::new();
//! bank.credit(&lp, &alice, 1_000)?;
//!
//! let mut farm = Farm::new(
//!     FarmConfig {
//!         address: farm_address,
//!         owner,
//!         dev,
//!         emission: EmissionSchedule {
//!             reward_per_block: 20,
//!             start_block: 0,
//!             bonus_multiplier: 1,
//!             bonus_end_block: 0,
//!             bonus_lock_up_bps: 0,
//!         },
//!     },
//!     token,
//!     bank,
//! )?;
//!
//! let pid = farm.add_pool(&Context::new(owner, 100), 300, lp, false)?;
//! farm.deposit(&Context::new(alice, 100), alice, pid, 1_000)?;
//! assert_eq!(farm.pending_reward(pid, &alice, 110)?, 200);
//! assert_eq!(farm.harvest(&Context::new(alice, 110), pid)?.reward, 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Overview
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | [`Farm::add_pool`] / [`Farm::set_pool`] | Register a stake asset, change its weight |
//! | [`Farm::set_bonus`] / [`Farm::set_reward_per_block`] | Emission parameters |
//! | [`Farm::deposit`] / [`Farm::withdraw`] / [`Farm::withdraw_all`] | Stake for an account, funder-guarded |
//! | [`Farm::harvest`] | Pay pending reward, lock its bonus-window share |
//! | [`Farm::emergency_withdraw`] | Principal back, reward forfeited |
//! | [`Farm::pending_reward`] | Projected reward at a block |
//! | [`RewardToken::unlock`] / [`RewardToken::transfer_all`] | Linear release of locked reward |
//! | [`RewardToken::delegate`] / [`RewardToken::delegate_by_sig`] | Delegate voting power |
//! | [`RewardToken::prior_votes`] | Voting power at a past block |

pub mod access;
pub mod bank;
pub mod checkpoints;
pub mod constants;
pub mod context;
pub mod delegation;
pub mod emission;
pub mod error;
pub mod farm;
pub mod math;
pub mod position;
pub mod token;
pub mod vesting;

pub use bank::{AssetBank, StakeBank};
pub use checkpoints::{Checkpoint, CheckpointIndex};
pub use context::Context;
pub use delegation::DelegationSignature;
pub use emission::{EmissionSchedule, Pool, Settlement};
pub use error::{Error, ErrorKind, Result};
pub use farm::{EmergencyWithdrawal, Farm, FarmConfig, Harvest};
pub use position::Position;
pub use token::{RewardToken, TokenConfig};
pub use vesting::{LockRecord, ReleaseWindow, VestingLedger};

//! Historical delegated voting power.
//!
//! Each delegate owns a dense, append-only list of `(from_block, votes)`
//! checkpoints. Several changes within one block collapse into a single
//! checkpoint, so `from_block` is strictly increasing along the list.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::constants::MAX_CHECKPOINT_BLOCK;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub from_block: u32,
    pub votes: u64,
}

/// Narrow a block number to the 32-bit checkpoint range.
pub fn checkpoint_block(block: u64) -> Result<u32> {
    if block > MAX_CHECKPOINT_BLOCK {
        return Err(Error::BlockNumberOverflow(block));
    }
    Ok(block as u32)
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointIndex {
    checkpoints: HashMap<Pubkey, Vec<Checkpoint>>,
}

impl CheckpointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self, account: &Pubkey) -> &[Checkpoint] {
        self.checkpoints
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn checkpoint_count(&self, account: &Pubkey) -> usize {
        self.checkpoints(account).len()
    }

    pub fn checkpoint(&self, account: &Pubkey, index: usize) -> Option<Checkpoint> {
        self.checkpoints(account).get(index).copied()
    }

    pub fn current_votes(&self, account: &Pubkey) -> u64 {
        self.checkpoints(account).last().map_or(0, |cp| cp.votes)
    }

    /// Votes `account` held at the end of `block_number`.
    ///
    /// Only blocks strictly before `current_block` are answerable: more
    /// changes can still land in the current block.
    pub fn prior_votes(
        &self,
        account: &Pubkey,
        block_number: u64,
        current_block: u64,
    ) -> Result<u64> {
        if block_number >= current_block {
            return Err(Error::VotesNotYetDetermined {
                requested: block_number,
                current: current_block,
            });
        }
        Ok(votes_at(self.checkpoints(account), block_number))
    }

    /// Record `votes` as the account's voting power from `block` on.
    pub fn write_checkpoint(&mut self, account: &Pubkey, votes: u64, block: u64) -> Result<()> {
        let block = checkpoint_block(block)?;
        self.ensure_appendable(account, block)?;
        self.put(account, votes, block);
        Ok(())
    }

    /// Move `amount` votes from one delegate to another at `block`.
    ///
    /// `None` stands for "no delegate" (minted, burned or undelegated
    /// balance) and is never written.
    pub fn move_votes(
        &mut self,
        src: Option<&Pubkey>,
        dst: Option<&Pubkey>,
        amount: u64,
        block: u64,
    ) -> Result<()> {
        if src == dst || amount == 0 {
            return Ok(());
        }
        let block = checkpoint_block(block)?;

        let src_votes = match src {
            Some(account) => {
                self.ensure_appendable(account, block)?;
                let votes = self
                    .current_votes(account)
                    .checked_sub(amount)
                    .ok_or(Error::MathOverflow)?;
                Some((account, votes))
            }
            None => None,
        };
        let dst_votes = match dst {
            Some(account) => {
                self.ensure_appendable(account, block)?;
                let votes = self
                    .current_votes(account)
                    .checked_add(amount)
                    .ok_or(Error::MathOverflow)?;
                Some((account, votes))
            }
            None => None,
        };

        if let Some((account, votes)) = src_votes {
            self.put(account, votes, block);
        }
        if let Some((account, votes)) = dst_votes {
            self.put(account, votes, block);
        }
        Ok(())
    }

    pub(crate) fn ensure_appendable(&self, account: &Pubkey, block: u32) -> Result<()> {
        match self.checkpoints(account).last() {
            Some(latest) if latest.from_block > block => Err(Error::InvalidParameter(
                "checkpoint block precedes the latest checkpoint",
            )),
            _ => Ok(()),
        }
    }

    fn put(&mut self, account: &Pubkey, votes: u64, block: u32) {
        let list = self.checkpoints.entry(*account).or_default();
        match list.last_mut() {
            Some(latest) if latest.from_block == block => latest.votes = votes,
            _ => list.push(Checkpoint {
                from_block: block,
                votes,
            }),
        }
        debug!(%account, block, votes, "votes checkpointed");
    }
}

/// Votes of the latest checkpoint with `from_block <= block`, zero if none.
fn votes_at(checkpoints: &[Checkpoint], block: u64) -> u64 {
    let Some(latest) = checkpoints.last() else {
        return 0;
    };
    if u64::from(latest.from_block) <= block {
        return latest.votes;
    }
    if u64::from(checkpoints[0].from_block) > block {
        return 0;
    }

    // Invariant: checkpoints[lower].from_block <= block < checkpoints[upper + 1].from_block
    let mut lower = 0usize;
    let mut upper = checkpoints.len() - 1;
    while upper > lower {
        // ceiling midpoint: center > lower, so `center - 1` cannot underflow
        let center = upper - (upper - lower) / 2;
        let cp = checkpoints[center];
        match u64::from(cp.from_block).cmp(&block) {
            Ordering::Equal => return cp.votes,
            Ordering::Less => lower = center,
            Ordering::Greater => upper = center - 1,
        }
    }
    checkpoints[lower].votes
}

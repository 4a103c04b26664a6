use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::error::{Error, Result};

/// Single transferable controller gating admin operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controller {
    owner: Pubkey,
}

impl Controller {
    pub fn new(owner: Pubkey) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn ensure_owner(&self, caller: &Pubkey) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::Unauthorized("caller is not the controller"));
        }
        Ok(())
    }

    pub fn transfer(&mut self, caller: &Pubkey, new_owner: Pubkey) -> Result<()> {
        self.ensure_owner(caller)?;
        if new_owner == Pubkey::default() {
            return Err(Error::InvalidParameter("new controller is the default key"));
        }
        info!(previous = %self.owner, next = %new_owner, "controller transferred");
        self.owner = new_owner;
        Ok(())
    }
}

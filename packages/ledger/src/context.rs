use solana_sdk::pubkey::Pubkey;

/// Who is invoking an operation, and when.
///
/// Every state-changing ledger operation takes one of these; the ledger
/// never reads a clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub caller: Pubkey,
    pub block: u64,
    /// Wall-clock seconds, only consulted for delegation-signature expiry.
    pub unix_timestamp: i64,
}

impl Context {
    pub fn new(caller: Pubkey, block: u64) -> Self {
        Self {
            caller,
            block,
            unix_timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, unix_timestamp: i64) -> Self {
        self.unix_timestamp = unix_timestamp;
        self
    }
}

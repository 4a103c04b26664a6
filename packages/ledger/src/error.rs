//! Ledger error type.

use solana_sdk::pubkey::Pubkey;

/// Coarse classification of every [`Error`].
///
/// Callers that only need to decide *how* to react (retry at a later block,
/// fix the request, escalate) match on this instead of the detailed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    InsufficientBalance,
    DuplicateResource,
    InvalidParameter,
    ReplayOrExpired,
    InvariantViolation,
}

/// All errors returned by the Furrow ledger.
///
/// Every operation that returns an error has left the ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // ── Access control ───────────────────────────────────────────────────────
    /// The caller is not the controller, the funder or the dev account the
    /// operation requires.
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    /// The delegation signature does not verify against its claimed signer.
    #[error("Invalid delegation signature")]
    InvalidSignature,

    // ── Balances ─────────────────────────────────────────────────────────────
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// `harvest` was called on a position with nothing staked.
    #[error("Nothing to harvest in pool {pid}")]
    NothingToHarvest { pid: usize },

    /// Minting would push the total supply past the cap.
    #[error("Supply cap exceeded: requested {requested}, headroom {headroom}")]
    CapExceeded { requested: u64, headroom: u64 },

    /// `unlock` was called by an account with no locked balance.
    #[error("Account has no locked balance")]
    NothingLocked,

    #[error("Manual mint limit exceeded: requested {requested}, headroom {headroom}")]
    ManualMintLimitExceeded { requested: u64, headroom: u64 },

    // ── Registry ─────────────────────────────────────────────────────────────
    #[error("A pool for stake asset {0} already exists")]
    DuplicatePool(Pubkey),

    #[error("Pool {0} does not exist")]
    PoolNotFound(usize),

    // ── Parameters ───────────────────────────────────────────────────────────
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Checkpoints store block numbers in 32 bits.
    #[error("Block number {0} exceeds 32 bits")]
    BlockNumberOverflow(u64),

    /// Prior votes can only be read for blocks strictly before the current one.
    #[error("Votes for block {requested} are not yet determined (current block {current})")]
    VotesNotYetDetermined { requested: u64, current: u64 },

    // ── Delegation replay protection ─────────────────────────────────────────
    #[error("Invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("Signature expired at {expiry} (now {now})")]
    SignatureExpired { expiry: i64, now: i64 },

    // ── Accounting invariants ────────────────────────────────────────────────
    /// A harvest would pay out more reward than the farm holds.
    #[error("Pending reward {pending} exceeds custodied reward {custody}")]
    RewardExceedsCustody { pending: u64, custody: u64 },

    #[error("Integer overflow in ledger math")]
    MathOverflow,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) | Error::InvalidSignature => ErrorKind::Unauthorized,
            Error::InsufficientBalance { .. }
            | Error::NothingToHarvest { .. }
            | Error::NothingLocked
            | Error::CapExceeded { .. }
            | Error::ManualMintLimitExceeded { .. } => ErrorKind::InsufficientBalance,
            Error::DuplicatePool(_) => ErrorKind::DuplicateResource,
            Error::InvalidParameter(_)
            | Error::PoolNotFound(_)
            | Error::BlockNumberOverflow(_)
            | Error::VotesNotYetDetermined { .. } => ErrorKind::InvalidParameter,
            Error::InvalidNonce { .. } | Error::SignatureExpired { .. } => {
                ErrorKind::ReplayOrExpired
            }
            Error::RewardExceedsCustody { .. } | Error::MathOverflow => {
                ErrorKind::InvariantViolation
            }
        }
    }
}

/// Convenience alias so every module can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

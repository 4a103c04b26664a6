/// Fixed-point scale of the reward accumulators and position debts.
pub const ACC_PRECISION: u128 = 1_000_000_000_000;

/// Denominator for basis-point math (u128 to avoid up-cast noise)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// The dev account receives `reward / DEV_SHARE_DIVISOR` on top of every
/// pool emission.
pub const DEV_SHARE_DIVISOR: u64 = 10;

/// Largest block number a checkpoint can record.
pub const MAX_CHECKPOINT_BLOCK: u64 = u32::MAX as u64;

/// Domain tag mixed into every delegation digest.
pub const DELEGATION_DOMAIN_TAG: &[u8] = b"furrow:delegation-domain:v1";
/// Struct tag for the `(delegatee, nonce, expiry)` payload.
pub const DELEGATION_STRUCT_TAG: &[u8] = b"furrow:delegation:v1";
/// Prefix separating the domain and struct hashes in the final digest.
pub const DELEGATION_DIGEST_PREFIX: &[u8] = b"\x19\x01";

//! Delegation by signature.
//!
//! A holder authorizes a delegate off-line by signing a digest of
//! `(delegatee, nonce, expiry)` bound to one token instance (its name and
//! custody address). Anyone can then submit the signed authorization.
//! Signatures are ed25519; "recovering" the signer means verifying the
//! signature against the key it claims to come from.

use solana_sdk::{
    hash::{hashv, Hash},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};

use crate::constants::{DELEGATION_DIGEST_PREFIX, DELEGATION_DOMAIN_TAG, DELEGATION_STRUCT_TAG};

/// A signed delegation authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationSignature {
    pub signer: Pubkey,
    pub signature: Signature,
}

/// Hash binding a delegation to one token instance.
pub fn domain_separator(token_name: &str, token_address: &Pubkey) -> Hash {
    hashv(&[
        DELEGATION_DOMAIN_TAG,
        token_name.as_bytes(),
        token_address.as_ref(),
    ])
}

/// Digest a holder signs to delegate to `delegatee`.
pub fn delegation_digest(domain: &Hash, delegatee: &Pubkey, nonce: u64, expiry: i64) -> Hash {
    let payload = hashv(&[
        DELEGATION_STRUCT_TAG,
        delegatee.as_ref(),
        &nonce.to_le_bytes(),
        &expiry.to_le_bytes(),
    ]);
    hashv(&[DELEGATION_DIGEST_PREFIX, domain.as_ref(), payload.as_ref()])
}

/// The signer of `digest`, if the signature is valid.
pub fn recover_signer(digest: &Hash, signed: &DelegationSignature) -> Option<Pubkey> {
    signed
        .signature
        .verify(signed.signer.as_ref(), digest.as_ref())
        .then_some(signed.signer)
}

/// Sign a delegation authorization with `keypair`.
pub fn sign_delegation(
    keypair: &Keypair,
    domain: &Hash,
    delegatee: &Pubkey,
    nonce: u64,
    expiry: i64,
) -> DelegationSignature {
    let digest = delegation_digest(domain, delegatee, nonce, expiry);
    DelegationSignature {
        signer: keypair.pubkey(),
        signature: keypair.sign_message(digest.as_ref()),
    }
}

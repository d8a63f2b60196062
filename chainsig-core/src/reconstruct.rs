//! Rebuilds a signed transaction from the signer's raw `(r, s)`.
//!
//! The signer does not report a usable recovery id, so every candidate `v`
//! for the transaction format is tried and the one that recovers the
//! expected sender is kept.

use ethereum_types::H256;

use crate::address::{address_from_public_key, to_checksum, Address};
use crate::error::{Error, Result};
use crate::remote_signer::RawSignatureShare;
use crate::transaction::{SignedTransaction, UnsignedTransaction};

/// Candidate `v` values in the order they are tried
pub fn recovery_candidates(tx: &UnsignedTransaction) -> Result<[u64; 2]> {
    Ok([tx.v_for_recovery_id(0)?, tx.v_for_recovery_id(1)?])
}

pub fn reconstruct(
    tx: UnsignedTransaction,
    hash: H256,
    share: &RawSignatureShare,
    expected_sender: Address,
) -> Result<SignedTransaction> {
    let signing_hash = tx.signing_hash();
    if hash != signing_hash {
        return Err(Error::SignatureMismatch(format!(
            "hash 0x{} does not match transaction signing hash 0x{}",
            hex::encode(hash),
            hex::encode(signing_hash)
        )));
    }

    let parsed = share.parse()?;

    let mut matches = Vec::with_capacity(2);
    for v in recovery_candidates(&tx)? {
        let candidate = SignedTransaction {
            transaction: tx.clone(),
            r: parsed.r,
            s: parsed.s,
            v,
        };

        match candidate.recover_public_key() {
            Ok(public_key) => {
                let recovered = address_from_public_key(&public_key);
                tracing::debug!(v, recovered = %to_checksum(&recovered), "Candidate recovered");
                if recovered == expected_sender {
                    matches.push((candidate, public_key));
                }
            }
            Err(e) => tracing::debug!(v, "Candidate did not recover: {}", e),
        }
    }

    if matches.len() != 1 {
        return Err(Error::SignatureMismatch(format!(
            "{} of 2 candidates recover {}",
            matches.len(),
            to_checksum(&expected_sender)
        )));
    }

    let (signed, public_key) = matches.remove(0);
    signed.verify(&public_key)?;

    let recovery_id = signed.recovery_id()?;
    if recovery_id != parsed.r_parity {
        tracing::debug!(
            recovery_id,
            r_parity = parsed.r_parity,
            "big_r parity disagrees with the selected candidate"
        );
    }

    Ok(signed)
}

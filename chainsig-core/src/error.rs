//! Error taxonomy for the derive → build → sign → reconstruct → relay pipeline.
//!
//! Every stage fails closed: an error aborts the pipeline before anything is
//! broadcast, and nothing here is retried on the caller's behalf.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Key derivation
    // =========================================================================
    /// The configured root public key could not be parsed as a secp256k1 point.
    #[error("invalid root public key: {0}")]
    InvalidRootKey(String),

    /// Derivation produced a degenerate key (point at infinity, bad scalar).
    #[error("invalid derivation: {0}")]
    InvalidDerivation(String),

    /// An EVM address string is malformed or fails its EIP-55 checksum.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // =========================================================================
    // Transaction building
    // =========================================================================
    #[error("invalid ABI call: {0}")]
    InvalidAbi(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Nonce or fee lookup failed.
    #[error("transaction builder unavailable: {0}")]
    BuilderUnavailable(String),

    // =========================================================================
    // Remote signer
    // =========================================================================
    /// The signer answered with something that is not a valid `[big_r, big_s]`
    /// pair, or the request itself could not be delivered.
    #[error("remote signer error: {0}")]
    RemoteSignerError(String),

    #[error("remote signer did not answer within {0:?}")]
    RemoteSignerTimeout(Duration),

    // =========================================================================
    // Reconstruction
    // =========================================================================
    /// No candidate (or more than one) recovers the expected sender.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The selected candidate does not pass plain ECDSA verification.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    // =========================================================================
    // Chain RPC
    // =========================================================================
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("chain rpc error: {0}")]
    Rpc(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Rpc(err.to_string())
    }
}

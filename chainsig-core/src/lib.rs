//! Chain-signature controlled EVM accounts.
//!
//! A controller identity plus a path string deterministically selects a child
//! key of an MPC-held root key. This crate derives the child address, builds
//! unsigned EVM transactions for it, turns the remote signer's raw `(r, s)`
//! into a fully valid signed transaction and relays it to the chain.

pub mod abi;
pub mod address;
pub mod broadcast;
pub mod builder;
pub mod derivation;
pub mod error;
pub mod pipeline;
pub mod reconstruct;
pub mod remote_signer;
pub mod rpc;
pub mod transaction;

use sha3::{Digest, Keccak256};

pub use address::{parse_address, to_checksum, Address};
pub use broadcast::{Broadcaster, TransactionRelay};
pub use builder::{ActionSpec, ChainConfig, ChainState, FeeEstimate, TransactionBuilder};
pub use derivation::{DerivationScheme, DerivedKey, KeyDerivation, RootPublicKey};
pub use error::{Error, Result};
pub use pipeline::{ChainSignatures, Execution, SignerSettings};
pub use reconstruct::reconstruct;
pub use remote_signer::{
    HttpRemoteSigner, LocalSigner, PayloadOrder, RawSignatureShare, RemoteSigner, SignRequest,
};
pub use rpc::JsonRpcClient;
pub use transaction::{FeeFields, SignedTransaction, TransactionFormat, UnsignedTransaction};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

//! Caller-facing facade over derive, build, sign, reconstruct and relay.

use std::sync::Arc;
use std::time::Duration;

use ethereum_types::H256;
use tracing::Instrument;

use crate::address::{to_checksum, Address};
use crate::broadcast::{Broadcaster, TransactionRelay};
use crate::builder::{ActionSpec, ChainConfig, ChainState, TransactionBuilder};
use crate::derivation::{DerivedKey, KeyDerivation};
use crate::error::{Error, Result};
use crate::reconstruct::{reconstruct, recovery_candidates};
use crate::remote_signer::{sign_with_timeout, RemoteSigner, SignRequest};
use crate::transaction::{SignedTransaction, TransactionFormat, UnsignedTransaction};

pub const DEFAULT_SIGN_TIMEOUT: Duration = Duration::from_secs(120);

/// How to address the remote signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSettings {
    pub contract_id: String,
    pub key_version: u32,
    pub timeout: Duration,
}

impl SignerSettings {
    pub fn new(contract_id: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            key_version: 0,
            timeout: DEFAULT_SIGN_TIMEOUT,
        }
    }
}

/// Result of a full [`ChainSignatures::execute`] run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub derived: DerivedKey,
    pub signed: SignedTransaction,
    pub transaction_hash: H256,
}

pub struct ChainSignatures {
    derivation: KeyDerivation,
    builder: TransactionBuilder,
    signer: Arc<dyn RemoteSigner>,
    broadcaster: Broadcaster,
    settings: SignerSettings,
}

impl ChainSignatures {
    pub fn new(
        derivation: KeyDerivation,
        config: ChainConfig,
        state: Arc<dyn ChainState>,
        signer: Arc<dyn RemoteSigner>,
        relay: Arc<dyn TransactionRelay>,
        settings: SignerSettings,
    ) -> Self {
        tracing::info!(
            root = %derivation.root(),
            scheme = derivation.scheme().as_str(),
            chain_id = config.chain_id,
            signer = %signer.description(),
            "Chain signatures pipeline ready"
        );

        Self {
            derivation,
            builder: TransactionBuilder::new(config, state),
            signer,
            broadcaster: Broadcaster::new(relay),
            settings,
        }
    }

    pub fn chain_config(&self) -> &ChainConfig {
        self.builder.config()
    }

    pub fn settings(&self) -> &SignerSettings {
        &self.settings
    }

    pub fn signer_description(&self) -> String {
        self.signer.description()
    }

    pub fn derive_address(&self, controller_id: &str, path: &str) -> Result<DerivedKey> {
        self.derivation.derive(controller_id, path)
    }

    /// Default action from `sender`, ready to be signed
    pub async fn create_unsigned_payload(
        &self,
        sender: Address,
    ) -> Result<(UnsignedTransaction, H256)> {
        self.builder.build_default(sender).await
    }

    pub async fn create_payload(
        &self,
        sender: Address,
        action: &ActionSpec,
        format: TransactionFormat,
    ) -> Result<(UnsignedTransaction, H256)> {
        self.builder.build(sender, action, format).await
    }

    /// Ask the signer for `(r, s)` over `hash` and rebuild the signed
    /// transaction for `sender`
    pub async fn request_signature(
        &self,
        contract_id: &str,
        path: &str,
        transaction: UnsignedTransaction,
        hash: H256,
        sender: Address,
    ) -> Result<SignedTransaction> {
        // Nothing reaches the signer unless it is this transaction's digest
        let signing_hash = transaction.signing_hash();
        if hash != signing_hash {
            return Err(Error::SignatureMismatch(format!(
                "hash 0x{} does not match transaction signing hash 0x{}",
                hex::encode(hash),
                hex::encode(signing_hash)
            )));
        }
        recovery_candidates(&transaction)?;

        let request = SignRequest {
            contract_id: contract_id.to_string(),
            path: path.to_string(),
            payload: hash.0,
            key_version: self.settings.key_version,
        };

        let share = sign_with_timeout(self.signer.as_ref(), &request, self.settings.timeout).await?;
        let signed = reconstruct(transaction, hash, &share, sender)?;

        tracing::info!(
            sender = %to_checksum(&sender),
            v = signed.v,
            "Signature reconstructed"
        );
        Ok(signed)
    }

    pub async fn relay(&self, signed: &SignedTransaction) -> Result<H256> {
        self.broadcaster.relay(signed).await
    }

    /// Derive, build, sign, reconstruct and relay the default action in
    /// sequence. Dropping the future before the signer answers relays
    /// nothing.
    pub async fn execute(&self, controller_id: &str, path: &str) -> Result<Execution> {
        let span = tracing::info_span!("execute", controller_id, path);
        async {
            let derived = self.derive_address(controller_id, path)?;
            let (transaction, hash) = self.create_unsigned_payload(derived.address).await?;
            let signed = self
                .request_signature(
                    &self.settings.contract_id,
                    path,
                    transaction,
                    hash,
                    derived.address,
                )
                .await?;
            let transaction_hash = self.relay(&signed).await?;

            Ok(Execution {
                derived,
                signed,
                transaction_hash,
            })
        }
        .instrument(span)
        .await
    }
}

//! Submission of signed transactions.

use std::sync::Arc;

use async_trait::async_trait;
use ethereum_types::H256;

use crate::error::{Error, Result};
use crate::transaction::SignedTransaction;

/// Anything that accepts raw signed transaction bytes
#[async_trait]
pub trait TransactionRelay: Send + Sync {
    /// Submit `raw` and return the transaction hash reported by the node
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256>;
}

pub struct Broadcaster {
    relay: Arc<dyn TransactionRelay>,
}

impl Broadcaster {
    pub fn new(relay: Arc<dyn TransactionRelay>) -> Self {
        Self { relay }
    }

    /// Serialize and submit once; failures are surfaced as
    /// [`Error::BroadcastFailed`] without retry
    pub async fn relay(&self, tx: &SignedTransaction) -> Result<H256> {
        let raw = tx.encode();
        let local_hash = tx.tx_hash();

        tracing::debug!(
            "Relaying {} byte {} transaction 0x{}",
            raw.len(),
            tx.transaction.format().as_str(),
            hex::encode(local_hash)
        );

        let reported = self.relay.send_raw_transaction(&raw).await.map_err(|e| match e {
            Error::BroadcastFailed(msg) => Error::BroadcastFailed(msg),
            other => Error::BroadcastFailed(other.to_string()),
        })?;

        if reported != local_hash {
            tracing::warn!(
                "Node reported transaction hash 0x{}, computed 0x{}",
                hex::encode(reported),
                hex::encode(local_hash)
            );
        }

        tracing::info!("Transaction 0x{} relayed", hex::encode(reported));
        Ok(reported)
    }
}

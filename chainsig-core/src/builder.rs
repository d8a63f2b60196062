//! Unsigned transaction construction.
//!
//! Nonce and fees come from an injected [`ChainState`]; the chain id and the
//! default action come from an explicit [`ChainConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use ethereum_types::{H256, U256};

use crate::abi::FunctionCall;
use crate::address::{to_checksum, Address};
use crate::error::{Error, Result};
use crate::transaction::{FeeFields, TransactionFormat, UnsignedTransaction};

/// Current fee levels, in the shape of one transaction format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeEstimate {
    Legacy {
        gas_price: U256,
    },
    FeeMarket {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl From<FeeEstimate> for FeeFields {
    fn from(estimate: FeeEstimate) -> Self {
        match estimate {
            FeeEstimate::Legacy { gas_price } => FeeFields::Legacy { gas_price },
            FeeEstimate::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => FeeFields::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
        }
    }
}

/// Read-only view of the target chain needed to fill in a transaction
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Next nonce for `address`, pending transactions included
    async fn get_nonce(&self, address: Address) -> Result<u64>;

    async fn get_fee_estimate(&self, format: TransactionFormat) -> Result<FeeEstimate>;
}

pub const DEFAULT_METHOD: &str = "withdraw";
pub const DEFAULT_GAS_LIMIT: u64 = 22000;

/// Target chain and the contract call issued when the caller names only a
/// sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub target: Address,
    pub method: String,
    pub gas_limit: u64,
    pub value: U256,
    pub format: TransactionFormat,
}

impl ChainConfig {
    pub fn new(chain_id: u64, target: Address) -> Self {
        Self {
            chain_id,
            target,
            method: DEFAULT_METHOD.to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            value: U256::zero(),
            format: TransactionFormat::default(),
        }
    }

    pub fn default_action(&self) -> Result<ActionSpec> {
        Ok(ActionSpec {
            to: self.target,
            call: FunctionCall::new(self.method.as_str())?,
            value: self.value,
            gas_limit: self.gas_limit,
        })
    }
}

/// Contract call to wrap in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub to: Address,
    pub call: FunctionCall,
    pub value: U256,
    pub gas_limit: u64,
}

pub struct TransactionBuilder {
    config: ChainConfig,
    state: Arc<dyn ChainState>,
}

impl TransactionBuilder {
    pub fn new(config: ChainConfig, state: Arc<dyn ChainState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Build `action` from `sender` and return it with its signing hash
    pub async fn build(
        &self,
        sender: Address,
        action: &ActionSpec,
        format: TransactionFormat,
    ) -> Result<(UnsignedTransaction, H256)> {
        let data = action.call.encode();

        let nonce = self
            .state
            .get_nonce(sender)
            .await
            .map_err(|e| Error::BuilderUnavailable(format!("nonce lookup failed: {}", e)))?;

        let estimate = self
            .state
            .get_fee_estimate(format)
            .await
            .map_err(|e| Error::BuilderUnavailable(format!("fee lookup failed: {}", e)))?;

        let fees = FeeFields::from(estimate);
        let tx = UnsignedTransaction {
            chain_id: self.config.chain_id,
            nonce,
            to: action.to,
            value: action.value,
            data,
            gas_limit: action.gas_limit,
            fees,
        };

        if tx.format() != format {
            return Err(Error::BuilderUnavailable(format!(
                "fee estimate is {}, requested {}",
                tx.format().as_str(),
                format.as_str()
            )));
        }

        let hash = tx.signing_hash();

        tracing::info!(
            sender = %to_checksum(&sender),
            nonce,
            format = format.as_str(),
            call = %action.call.human_readable(),
            "Built unsigned transaction 0x{}",
            hex::encode(hash)
        );

        Ok((tx, hash))
    }

    /// Build the configured default action
    pub async fn build_default(&self, sender: Address) -> Result<(UnsignedTransaction, H256)> {
        let action = self.config.default_action()?;
        self.build(sender, &action, self.config.format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_address;

    struct FixedState {
        nonce: u64,
        estimate: Option<FeeEstimate>,
    }

    #[async_trait]
    impl ChainState for FixedState {
        async fn get_nonce(&self, _address: Address) -> Result<u64> {
            Ok(self.nonce)
        }

        async fn get_fee_estimate(&self, _format: TransactionFormat) -> Result<FeeEstimate> {
            self.estimate
                .ok_or_else(|| Error::Rpc("connection refused".to_string()))
        }
    }

    fn config() -> ChainConfig {
        ChainConfig::new(
            11155111,
            parse_address("0x6d454714c3Ac6D2deB4eA123254BD87DD14Fd729").unwrap(),
        )
    }

    fn sender() -> Address {
        parse_address("0xDe0d1E9eB30dDA375F70005Ee6F750ff5Ed80eb9").unwrap()
    }

    #[tokio::test]
    async fn test_build_default_withdraw() {
        let state = FixedState {
            nonce: 0,
            estimate: Some(FeeEstimate::FeeMarket {
                max_fee_per_gas: U256::from(30_000_000_000u64),
                max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            }),
        };
        let builder = TransactionBuilder::new(config(), Arc::new(state));

        let (tx, hash) = builder.build_default(sender()).await.unwrap();
        assert_eq!(tx.format(), TransactionFormat::FeeMarket);
        assert_eq!(tx.data, hex::decode("3ccfd60b").unwrap());
        assert_eq!(tx.gas_limit, 22000);
        assert!(tx.value.is_zero());
        assert_eq!(
            hex::encode(hash),
            "64c0ae31c712e02722ce85e554d1c89d4070e750835f65ae384ec626baf5a570"
        );
    }

    #[tokio::test]
    async fn test_build_legacy() {
        let state = FixedState {
            nonce: 3,
            estimate: Some(FeeEstimate::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            }),
        };
        let builder = TransactionBuilder::new(config(), Arc::new(state));
        let action = config().default_action().unwrap();

        let (_, hash) = builder
            .build(sender(), &action, TransactionFormat::Legacy)
            .await
            .unwrap();
        assert_eq!(
            hex::encode(hash),
            "cca4995fc3641b42bf2cba1ad9bc06703631a9677657cd3053f30c0aa3f24e80"
        );
    }

    #[tokio::test]
    async fn test_fee_lookup_failure() {
        let state = FixedState {
            nonce: 0,
            estimate: None,
        };
        let builder = TransactionBuilder::new(config(), Arc::new(state));
        assert!(matches!(
            builder.build_default(sender()).await,
            Err(Error::BuilderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fee_shape_must_match_format() {
        let state = FixedState {
            nonce: 0,
            estimate: Some(FeeEstimate::Legacy {
                gas_price: U256::from(1u64),
            }),
        };
        let builder = TransactionBuilder::new(config(), Arc::new(state));
        let action = config().default_action().unwrap();
        assert!(matches!(
            builder
                .build(sender(), &action, TransactionFormat::FeeMarket)
                .await,
            Err(Error::BuilderUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_default_method() {
        let mut config = config();
        config.method = "not a method".to_string();
        assert!(matches!(config.default_action(), Err(Error::InvalidAbi(_))));
    }
}

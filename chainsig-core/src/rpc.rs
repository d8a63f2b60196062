//! JSON-RPC client for the target EVM chain.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ethereum_types::{H256, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::address::Address;
use crate::broadcast::TransactionRelay;
use crate::builder::{ChainState, FeeEstimate};
use crate::error::{Error, Result};
use crate::transaction::TransactionFormat;

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;
const WEI_PER_CENT: u64 = WEI_PER_ETH / 100;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(method, id, "JSON-RPC request");

        let resp = self
            .client
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                method,
                params,
                id,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Rpc(format!("{} returned {}: {}", method, status, body)));
        }

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(error) = body.error {
            return Err(Error::Rpc(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        body.result
            .ok_or_else(|| Error::Rpc(format!("{} returned no result", method)))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<U256> {
        let hex: String = self.call(method, params).await?;
        parse_quantity(&hex)
    }

    pub async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let count = self
            .quantity(
                "eth_getTransactionCount",
                json!([format!("0x{}", hex::encode(address)), "pending"]),
            )
            .await?;
        if count > U256::from(u64::MAX) {
            return Err(Error::Rpc(format!("nonce out of range: {}", count)));
        }
        Ok(count.as_u64())
    }

    pub async fn gas_price(&self) -> Result<U256> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    pub async fn max_priority_fee_per_gas(&self) -> Result<U256> {
        self.quantity("eth_maxPriorityFeePerGas", json!([])).await
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        self.quantity("eth_getBalance", json!([format!("0x{}", hex::encode(address)), "latest"]))
            .await
    }

    pub async fn submit_raw_transaction(&self, raw: &[u8]) -> Result<H256> {
        let hash: String = self
            .call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await
            .map_err(|e| match e {
                Error::Rpc(msg) => Error::BroadcastFailed(msg),
                other => other,
            })?;
        parse_hash(&hash)
    }
}

#[async_trait]
impl ChainState for JsonRpcClient {
    async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.get_transaction_count(address).await
    }

    async fn get_fee_estimate(&self, format: TransactionFormat) -> Result<FeeEstimate> {
        let gas_price = self.gas_price().await?;
        match format {
            TransactionFormat::Legacy => Ok(FeeEstimate::Legacy { gas_price }),
            TransactionFormat::FeeMarket => {
                let priority = self.max_priority_fee_per_gas().await?;
                Ok(FeeEstimate::FeeMarket {
                    max_fee_per_gas: gas_price.saturating_add(priority),
                    max_priority_fee_per_gas: priority,
                })
            }
        }
    }
}

#[async_trait]
impl TransactionRelay for JsonRpcClient {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256> {
        self.submit_raw_transaction(raw).await
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1b4`
pub fn parse_quantity(s: &str) -> Result<U256> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::Rpc(format!("quantity without 0x prefix: {}", s)))?;
    if digits.is_empty() {
        return Err(Error::Rpc("empty quantity".to_string()));
    }
    U256::from_str_radix(digits, 16).map_err(|e| Error::Rpc(format!("bad quantity {}: {:?}", s, e)))
}

fn parse_hash(s: &str) -> Result<H256> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| Error::Rpc(format!("bad hash {}: {}", s, e)))?;
    if bytes.len() != 32 {
        return Err(Error::Rpc(format!("hash must be 32 bytes: {}", s)));
    }
    Ok(H256::from_slice(&bytes))
}

/// Wei rendered as ETH, truncated to two decimals
pub fn format_eth(wei: U256) -> String {
    let cents = wei / U256::from(WEI_PER_CENT);
    let whole = cents / U256::from(100u64);
    let fraction = (cents % U256::from(100u64)).as_u64();
    format!("{}.{:02}", whole, fraction)
}

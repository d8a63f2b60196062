//! HTTP surface over the chain signatures pipeline.
//!
//! Amounts are decimal wei strings, byte strings are `0x` hex.

use chainsig_core::rpc::format_eth;
use chainsig_core::{
    parse_address, to_checksum, ChainSignatures, Error, FeeFields, JsonRpcClient,
    SignedTransaction, TransactionFormat, UnsignedTransaction,
};
use ethereum_types::{H256, U256};
use poem_openapi::param::Query;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use std::sync::Arc;

pub struct ChainSignaturesApi {
    pub chainsig: Arc<ChainSignatures>,
    pub rpc: Arc<JsonRpcClient>,
}

#[derive(Debug, Object)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, ApiResponse)]
pub enum ApiError {
    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),
    /// Signature does not belong to the transaction or sender
    #[oai(status = 422)]
    Unprocessable(Json<ErrorResponse>),
    #[oai(status = 500)]
    InternalError(Json<ErrorResponse>),
    /// Signer or chain node rejected the request
    #[oai(status = 502)]
    BadGateway(Json<ErrorResponse>),
    /// Nonce or fee lookup failed
    #[oai(status = 503)]
    ServiceUnavailable(Json<ErrorResponse>),
    #[oai(status = 504)]
    GatewayTimeout(Json<ErrorResponse>),
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        ApiError::BadRequest(Json(ErrorResponse {
            error: error.into(),
        }))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        tracing::warn!("Request failed: {}", err);

        let body = Json(ErrorResponse {
            error: err.to_string(),
        });
        match err {
            Error::InvalidRootKey(_)
            | Error::InvalidDerivation(_)
            | Error::InvalidAddress(_)
            | Error::InvalidAbi(_)
            | Error::InvalidTransaction(_) => ApiError::BadRequest(body),
            Error::SignatureMismatch(_) | Error::SignatureInvalid(_) => {
                ApiError::Unprocessable(body)
            }
            Error::RemoteSignerError(_) | Error::BroadcastFailed(_) | Error::Rpc(_) => {
                ApiError::BadGateway(body)
            }
            Error::BuilderUnavailable(_) => ApiError::ServiceUnavailable(body),
            Error::RemoteSignerTimeout(_) => ApiError::GatewayTimeout(body),
            _ => ApiError::InternalError(body),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Object)]
pub struct AddressResponse {
    pub controller_id: String,
    pub path: String,
    /// Uncompressed `04...` hex
    pub public_key: String,
    /// EIP-55 checksummed
    pub address: String,
}

#[derive(Debug, Object)]
pub struct BalanceResponse {
    pub address: String,
    pub balance_wei: String,
    /// Truncated to two decimals
    pub balance_eth: String,
}

#[derive(Debug, Object, Clone, PartialEq, Eq)]
pub struct TransactionDto {
    /// `legacy` or `fee-market`
    pub format: String,
    pub chain_id: u64,
    pub nonce: u64,
    pub to: String,
    pub value: String,
    pub data: String,
    pub gas_limit: u64,
    /// Legacy only
    pub gas_price: Option<String>,
    /// Fee-market only
    pub max_fee_per_gas: Option<String>,
    /// Fee-market only
    pub max_priority_fee_per_gas: Option<String>,
}

impl From<&UnsignedTransaction> for TransactionDto {
    fn from(tx: &UnsignedTransaction) -> Self {
        let (gas_price, max_fee_per_gas, max_priority_fee_per_gas) = match tx.fees {
            FeeFields::Legacy { gas_price } => (Some(gas_price.to_string()), None, None),
            FeeFields::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (
                None,
                Some(max_fee_per_gas.to_string()),
                Some(max_priority_fee_per_gas.to_string()),
            ),
        };

        Self {
            format: tx.format().as_str().to_string(),
            chain_id: tx.chain_id,
            nonce: tx.nonce,
            to: to_checksum(&tx.to),
            value: tx.value.to_string(),
            data: format!("0x{}", hex::encode(&tx.data)),
            gas_limit: tx.gas_limit,
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }
}

impl TransactionDto {
    pub fn to_unsigned(&self) -> Result<UnsignedTransaction, ApiError> {
        let fees = match parse_format(&self.format)? {
            TransactionFormat::Legacy => FeeFields::Legacy {
                gas_price: required_wei("gas_price", &self.gas_price)?,
            },
            TransactionFormat::FeeMarket => FeeFields::FeeMarket {
                max_fee_per_gas: required_wei("max_fee_per_gas", &self.max_fee_per_gas)?,
                max_priority_fee_per_gas: required_wei(
                    "max_priority_fee_per_gas",
                    &self.max_priority_fee_per_gas,
                )?,
            },
        };

        Ok(UnsignedTransaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            to: parse_address(&self.to)?,
            value: parse_wei("value", &self.value)?,
            data: parse_hex("data", &self.data)?,
            gas_limit: self.gas_limit,
            fees,
        })
    }
}

#[derive(Debug, Object)]
pub struct PayloadRequest {
    pub sender: String,
}

#[derive(Debug, Object)]
pub struct PayloadResponse {
    pub transaction: TransactionDto,
    /// Signing hash
    pub hash: String,
}

#[derive(Debug, Object)]
pub struct SignTransactionRequest {
    pub path: String,
    pub transaction: TransactionDto,
    pub hash: String,
    pub sender: String,
    /// Defaults to the configured signer contract
    pub contract_id: Option<String>,
}

#[derive(Debug, Object, Clone, PartialEq, Eq)]
pub struct SignedTransactionDto {
    pub transaction: TransactionDto,
    pub r: String,
    pub s: String,
    pub v: u64,
    /// Serialized transaction, as relayed
    pub raw: String,
    pub transaction_hash: String,
}

impl From<&SignedTransaction> for SignedTransactionDto {
    fn from(signed: &SignedTransaction) -> Self {
        Self {
            transaction: TransactionDto::from(&signed.transaction),
            r: format!("0x{}", hex::encode(&signed.compact_signature()[..32])),
            s: format!("0x{}", hex::encode(&signed.compact_signature()[32..])),
            v: signed.v,
            raw: signed.raw_hex(),
            transaction_hash: format!("0x{}", hex::encode(signed.tx_hash())),
        }
    }
}

impl SignedTransactionDto {
    pub fn to_signed(&self) -> Result<SignedTransaction, ApiError> {
        let signed = SignedTransaction {
            transaction: self.transaction.to_unsigned()?,
            r: U256::from_big_endian(&parse_fixed::<32>("r", &self.r)?),
            s: U256::from_big_endian(&parse_fixed::<32>("s", &self.s)?),
            v: self.v,
        };
        signed.recovery_id()?;
        Ok(signed)
    }
}

#[derive(Debug, Object)]
pub struct RelayResponse {
    pub transaction_hash: String,
}

#[derive(Debug, Object)]
pub struct ExecuteRequest {
    pub controller_id: String,
    pub path: String,
}

#[derive(Debug, Object)]
pub struct ExecuteResponse {
    pub address: String,
    pub signed: SignedTransactionDto,
    pub transaction_hash: String,
}

#[derive(Debug, Object)]
pub struct HealthResponse {
    pub status: String,
    pub chain_id: u64,
    pub signer: String,
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn parse_format(format: &str) -> Result<TransactionFormat, ApiError> {
    match format {
        "legacy" => Ok(TransactionFormat::Legacy),
        "fee-market" => Ok(TransactionFormat::FeeMarket),
        other => Err(ApiError::bad_request(format!(
            "format must be 'legacy' or 'fee-market', got '{}'",
            other
        ))),
    }
}

fn parse_wei(field: &str, value: &str) -> Result<U256, ApiError> {
    U256::from_dec_str(value)
        .map_err(|e| ApiError::bad_request(format!("{} is not a decimal amount: {:?}", field, e)))
}

fn required_wei(field: &str, value: &Option<String>) -> Result<U256, ApiError> {
    let value = value
        .as_deref()
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))?;
    parse_wei(field, value)
}

fn parse_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ApiError::bad_request(format!("{} is not hex: {}", field, e)))
}

fn parse_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], ApiError> {
    let bytes = parse_hex(field, value)?;
    bytes
        .try_into()
        .map_err(|_| ApiError::bad_request(format!("{} must be {} bytes", field, N)))
}

fn parse_hash(value: &str) -> Result<H256, ApiError> {
    Ok(H256(parse_fixed::<32>("hash", value)?))
}

// ============================================================================
// Endpoints
// ============================================================================

#[OpenApi]
impl ChainSignaturesApi {
    /// Derive the EVM address controlled by `controller_id` at `path`
    #[oai(path = "/api/address", method = "get")]
    async fn derive_address(
        &self,
        Query(controller_id): Query<String>,
        Query(path): Query<String>,
    ) -> Result<Json<AddressResponse>, ApiError> {
        let derived = self.chainsig.derive_address(&controller_id, &path)?;

        Ok(Json(AddressResponse {
            controller_id,
            path,
            public_key: derived.public_key_hex(),
            address: derived.address_checksum(),
        }))
    }

    /// Balance of an address on the target chain
    #[oai(path = "/api/balance", method = "get")]
    async fn balance(
        &self,
        Query(address): Query<String>,
    ) -> Result<Json<BalanceResponse>, ApiError> {
        let address = parse_address(&address)?;
        let wei = self.rpc.get_balance(address).await?;

        Ok(Json(BalanceResponse {
            address: to_checksum(&address),
            balance_wei: wei.to_string(),
            balance_eth: format_eth(wei),
        }))
    }

    /// Build the configured default call from `sender`
    #[oai(path = "/api/transaction/payload", method = "post")]
    async fn create_payload(
        &self,
        req: Json<PayloadRequest>,
    ) -> Result<Json<PayloadResponse>, ApiError> {
        let sender = parse_address(&req.sender)?;
        let (tx, hash) = self.chainsig.create_unsigned_payload(sender).await?;

        Ok(Json(PayloadResponse {
            transaction: TransactionDto::from(&tx),
            hash: format!("0x{}", hex::encode(hash)),
        }))
    }

    /// Request a signature for a payload and rebuild the signed transaction
    #[oai(path = "/api/transaction/sign", method = "post")]
    async fn sign_transaction(
        &self,
        req: Json<SignTransactionRequest>,
    ) -> Result<Json<SignedTransactionDto>, ApiError> {
        let tx = req.transaction.to_unsigned()?;
        let hash = parse_hash(&req.hash)?;
        let sender = parse_address(&req.sender)?;
        let contract_id = req
            .contract_id
            .as_deref()
            .unwrap_or(self.chainsig.settings().contract_id.as_str());

        let signed = self
            .chainsig
            .request_signature(contract_id, &req.path, tx, hash, sender)
            .await?;

        Ok(Json(SignedTransactionDto::from(&signed)))
    }

    /// Broadcast a signed transaction
    #[oai(path = "/api/transaction/relay", method = "post")]
    async fn relay(
        &self,
        req: Json<SignedTransactionDto>,
    ) -> Result<Json<RelayResponse>, ApiError> {
        let signed = req.to_signed()?;
        let hash = self.chainsig.relay(&signed).await?;

        Ok(Json(RelayResponse {
            transaction_hash: format!("0x{}", hex::encode(hash)),
        }))
    }

    /// Derive, build, sign and relay the default call in one request
    #[oai(path = "/api/execute", method = "post")]
    async fn execute(
        &self,
        req: Json<ExecuteRequest>,
    ) -> Result<Json<ExecuteResponse>, ApiError> {
        let execution = self
            .chainsig
            .execute(&req.controller_id, &req.path)
            .await?;

        Ok(Json(ExecuteResponse {
            address: execution.derived.address_checksum(),
            signed: SignedTransactionDto::from(&execution.signed),
            transaction_hash: format!("0x{}", hex::encode(execution.transaction_hash)),
        }))
    }

    #[oai(path = "/api/health", method = "get")]
    async fn health(&self) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "ok".to_string(),
            chain_id: self.chainsig.chain_config().chain_id,
            signer: self.chainsig.signer_description(),
        })
    }
}

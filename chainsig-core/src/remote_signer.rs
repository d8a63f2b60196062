//! Clients for the threshold signer that holds the root key.
//!
//! The signer only ever returns raw `(big_r, big_s)`; the recovery bit is
//! worked out afterwards by [`crate::reconstruct`].

use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::U256;
use secp256k1::constants::CURVE_ORDER;
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::derivation::{derive_epsilon, DerivationScheme};
use crate::error::{Error, Result};

pub const DEFAULT_SIGN_GAS: &str = "250000000000000";
pub const DEFAULT_SIGN_DEPOSIT: &str = "0";

/// Raw answer of the signer: compressed R point and s, both hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignatureShare {
    pub big_r: String,
    pub big_s: String,
}

/// `(r, s)` taken out of a [`RawSignatureShare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedShare {
    pub r: U256,
    pub s: U256,
    /// Parity of R.y from the `02`/`03` prefix of `big_r`
    pub r_parity: u8,
}

impl RawSignatureShare {
    pub fn new(big_r: impl Into<String>, big_s: impl Into<String>) -> Self {
        Self {
            big_r: big_r.into(),
            big_s: big_s.into(),
        }
    }

    pub fn parse(&self) -> Result<ParsedShare> {
        let big_r = decode_hex("big_r", &self.big_r, 33)?;
        let big_s = decode_hex("big_s", &self.big_s, 32)?;

        let r_parity = match big_r[0] {
            0x02 => 0,
            0x03 => 1,
            other => {
                return Err(Error::RemoteSignerError(format!(
                    "big_r prefix must be 02 or 03, got {:02x}",
                    other
                )))
            }
        };

        let r = scalar("r", &big_r[1..])?;
        let s = scalar("s", &big_s)?;

        Ok(ParsedShare { r, s, r_parity })
    }
}

fn decode_hex(field: &str, value: &str, expected_len: usize) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(digits)
        .map_err(|e| Error::RemoteSignerError(format!("{} is not hex: {}", field, e)))?;
    if bytes.len() != expected_len {
        return Err(Error::RemoteSignerError(format!(
            "{} must be {} bytes, got {}",
            field,
            expected_len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn scalar(field: &str, bytes: &[u8]) -> Result<U256> {
    let value = U256::from_big_endian(bytes);
    if value.is_zero() || value >= U256::from_big_endian(&CURVE_ORDER) {
        return Err(Error::RemoteSignerError(format!(
            "{} is not a valid secp256k1 scalar",
            field
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Signer contract the request is addressed to
    pub contract_id: String,
    pub path: String,
    /// Signing hash, in natural byte order
    pub payload: [u8; 32],
    pub key_version: u32,
}

#[async_trait]
pub trait RemoteSigner: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> Result<RawSignatureShare>;

    /// Human-readable description for logs
    fn description(&self) -> String;
}

/// Run `signer.sign` under a hard deadline
pub async fn sign_with_timeout(
    signer: &dyn RemoteSigner,
    request: &SignRequest,
    timeout: Duration,
) -> Result<RawSignatureShare> {
    tracing::debug!(
        signer = %signer.description(),
        contract_id = %request.contract_id,
        path = %request.path,
        "Requesting signature for 0x{}",
        hex::encode(request.payload)
    );

    match tokio::time::timeout(timeout, signer.sign(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::RemoteSignerTimeout(timeout)),
    }
}

/// Byte order of the payload on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadOrder {
    /// Reversed, as the deployed multichain contract expects
    #[default]
    Reversed,
    Natural,
}

impl PayloadOrder {
    pub fn apply(&self, payload: [u8; 32]) -> [u8; 32] {
        match self {
            PayloadOrder::Reversed => {
                let mut reversed = payload;
                reversed.reverse();
                reversed
            }
            PayloadOrder::Natural => payload,
        }
    }
}

#[derive(Debug, Serialize)]
struct SignArgs<'a> {
    payload: [u8; 32],
    path: &'a str,
    key_version: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCallBody<'a> {
    contract_id: &'a str,
    method: &'static str,
    args: SignArgs<'a>,
    gas: &'a str,
    deposit: &'a str,
}

/// Calls `sign` on the signer contract through an HTTP gateway
pub struct HttpRemoteSigner {
    client: reqwest::Client,
    url: String,
    payload_order: PayloadOrder,
    gas: String,
    deposit: String,
}

impl HttpRemoteSigner {
    pub fn new(url: impl Into<String>, payload_order: PayloadOrder) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            payload_order,
            gas: DEFAULT_SIGN_GAS.to_string(),
            deposit: DEFAULT_SIGN_DEPOSIT.to_string(),
        }
    }

    pub fn with_gas(mut self, gas: impl Into<String>, deposit: impl Into<String>) -> Self {
        self.gas = gas.into();
        self.deposit = deposit.into();
        self
    }

    fn body<'a>(&'a self, request: &'a SignRequest) -> FunctionCallBody<'a> {
        FunctionCallBody {
            contract_id: &request.contract_id,
            method: "sign",
            args: SignArgs {
                payload: self.payload_order.apply(request.payload),
                path: &request.path,
                key_version: request.key_version,
            },
            gas: &self.gas,
            deposit: &self.deposit,
        }
    }
}

#[async_trait]
impl RemoteSigner for HttpRemoteSigner {
    async fn sign(&self, request: &SignRequest) -> Result<RawSignatureShare> {
        let resp = self
            .client
            .post(&self.url)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| Error::RemoteSignerError(format!("request failed: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::RemoteSignerError(format!("failed to read response: {}", e)))?;

        let share = parse_response(status, &body)?;
        tracing::debug!(big_r = %share.big_r, big_s = %share.big_s, "Signer answered");

        Ok(share)
    }

    fn description(&self) -> String {
        format!("http signer at {}", self.url)
    }
}

/// Signer answer: a two-element `[big_r, big_s]` array on success
fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<RawSignatureShare> {
    if !status.is_success() {
        return Err(Error::RemoteSignerError(format!(
            "signer returned {}: {}",
            status, body
        )));
    }

    let (big_r, big_s): (String, String) = serde_json::from_str(body)
        .map_err(|e| Error::RemoteSignerError(format!("invalid response: {}", e)))?;

    Ok(RawSignatureShare { big_r, big_s })
}

/// Signs with a locally held root secret, deriving child keys the same way
/// the threshold network does. For dev chains and tests.
pub struct LocalSigner {
    root_secret: SecretKey,
    scheme: DerivationScheme,
    controller_id: String,
}

impl LocalSigner {
    pub fn new(
        root_secret: SecretKey,
        scheme: DerivationScheme,
        controller_id: impl Into<String>,
    ) -> Self {
        Self {
            root_secret,
            scheme,
            controller_id: controller_id.into(),
        }
    }

    pub fn from_hex(
        secret_hex: &str,
        scheme: DerivationScheme,
        controller_id: impl Into<String>,
    ) -> Result<Self> {
        let digits = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
        let bytes = hex::decode(digits).map_err(|e| Error::InvalidRootKey(e.to_string()))?;
        let root_secret =
            SecretKey::from_slice(&bytes).map_err(|e| Error::InvalidRootKey(e.to_string()))?;
        Ok(Self::new(root_secret, scheme, controller_id))
    }

    pub fn public_key(&self) -> secp256k1::PublicKey {
        self.root_secret.public_key(&Secp256k1::new())
    }

    fn child_secret(&self, path: &str) -> Result<SecretKey> {
        let epsilon = derive_epsilon(self.scheme, &self.controller_id, path)?;
        self.root_secret
            .add_tweak(&epsilon)
            .map_err(|e| Error::InvalidDerivation(e.to_string()))
    }
}

#[async_trait]
impl RemoteSigner for LocalSigner {
    async fn sign(&self, request: &SignRequest) -> Result<RawSignatureShare> {
        let child = self
            .child_secret(&request.path)
            .map_err(|e| Error::RemoteSignerError(e.to_string()))?;

        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(request.payload);
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&message, &child)
            .serialize_compact();

        // Low-s normalisation is already folded into the recovery id
        let prefix = 0x02 + (recovery_id.to_i32() & 1) as u8;

        Ok(RawSignatureShare {
            big_r: format!("{:02x}{}", prefix, hex::encode(&compact[..32])),
            big_s: hex::encode(&compact[32..]),
        })
    }

    fn description(&self) -> String {
        format!(
            "local signer for {} ({})",
            self.controller_id,
            self.scheme.as_str()
        )
    }
}

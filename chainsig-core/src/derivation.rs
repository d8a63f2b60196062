//! Non-hardened child key derivation relative to the MPC root key
//!
//! `child = root + epsilon * G`, where epsilon is a deterministic function of
//! the controller identity and the path. Anyone holding the root public key can
//! compute the child public key; only the MPC network can sign for it.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1};
use serde::Deserialize;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::address::{address_from_public_key, to_checksum, Address};
use crate::error::{Error, Result};

const HMAC_EPSILON_KEY: &[u8] = b"chainsig epsilon derivation v1";
const HMAC_ALGORITHM_TAG: &[u8] = b"secp256k1:";
const NEAR_EPSILON_PREFIX: &str = "near-mpc-recovery v0.1.0 epsilon derivation:";
const NEAR_KEY_PREFIX: &str = "secp256k1:";

/// How epsilon is computed from `(controller_id, path)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DerivationScheme {
    /// HMAC-SHA256 keyed with a fixed tag, re-expanded with a counter until
    /// the output is a valid non-zero scalar
    #[default]
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    /// SHA3-256 over the NEAR MPC v0.1.0 prefix, as used by the deployed
    /// multichain contract
    #[serde(rename = "near-mpc-v1")]
    NearMpcV1,
}

impl DerivationScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationScheme::HmacSha256 => "hmac-sha256",
            DerivationScheme::NearMpcV1 => "near-mpc-v1",
        }
    }
}

/// Long-lived public key of the threshold signing group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootPublicKey(PublicKey);

impl RootPublicKey {
    pub fn new(public_key: PublicKey) -> Self {
        Self(public_key)
    }

    /// Parse from SEC1 bytes (65-byte uncompressed or 33-byte compressed)
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| Error::InvalidRootKey(format!("not a secp256k1 point: {}", e)))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// 65-byte `0x04 || X || Y`
    pub fn to_uncompressed(&self) -> [u8; 65] {
        self.0.serialize_uncompressed()
    }

    /// NEAR textual form: `secp256k1:<base58 of X || Y>`
    pub fn to_near_string(&self) -> String {
        format!(
            "{}{}",
            NEAR_KEY_PREFIX,
            bs58::encode(&self.to_uncompressed()[1..]).into_string()
        )
    }
}

impl FromStr for RootPublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(encoded) = s.strip_prefix(NEAR_KEY_PREFIX) {
            let xy = bs58::decode(encoded)
                .into_vec()
                .map_err(|e| Error::InvalidRootKey(format!("invalid base58: {}", e)))?;
            if xy.len() != 64 {
                return Err(Error::InvalidRootKey(format!(
                    "expected 64 bytes after {}, got {}",
                    NEAR_KEY_PREFIX,
                    xy.len()
                )));
            }
            let mut uncompressed = Vec::with_capacity(65);
            uncompressed.push(0x04);
            uncompressed.extend_from_slice(&xy);
            return Self::from_slice(&uncompressed);
        }

        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(digits).map_err(|e| Error::InvalidRootKey(format!("invalid hex: {}", e)))?;
        match bytes.len() {
            33 | 65 => Self::from_slice(&bytes),
            n => Err(Error::InvalidRootKey(format!(
                "expected 33 or 65 bytes, got {}",
                n
            ))),
        }
    }
}

impl fmt::Display for RootPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_near_string())
    }
}

/// Child key and its EVM address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedKey {
    pub public_key: PublicKey,
    pub address: Address,
}

impl DerivedKey {
    /// Uncompressed `04...` hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    pub fn address_checksum(&self) -> String {
        to_checksum(&self.address)
    }
}

/// Compute epsilon for a controller/path pair
pub fn derive_epsilon(scheme: DerivationScheme, controller_id: &str, path: &str) -> Result<Scalar> {
    check_input(controller_id, path)?;

    match scheme {
        DerivationScheme::HmacSha256 => {
            for counter in 0..=u8::MAX {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(HMAC_EPSILON_KEY)
                    .map_err(|e| Error::InvalidDerivation(e.to_string()))?;
                mac.update(HMAC_ALGORITHM_TAG);
                mac.update(controller_id.as_bytes());
                mac.update(b",");
                mac.update(path.as_bytes());
                mac.update(&[counter]);
                let bytes: [u8; 32] = mac.finalize().into_bytes().into();

                if bytes == [0u8; 32] {
                    continue;
                }
                if let Ok(scalar) = Scalar::from_be_bytes(bytes) {
                    return Ok(scalar);
                }
            }
            Err(Error::InvalidDerivation(
                "no valid scalar within counter range".to_string(),
            ))
        }
        DerivationScheme::NearMpcV1 => {
            let input = format!("{}{},{}", NEAR_EPSILON_PREFIX, controller_id, path);
            let bytes: [u8; 32] = Sha3_256::digest(input.as_bytes()).into();
            Scalar::from_be_bytes(bytes)
                .map_err(|_| Error::InvalidDerivation("epsilon exceeds curve order".to_string()))
        }
    }
}

fn check_input(controller_id: &str, path: &str) -> Result<()> {
    if controller_id.is_empty() {
        return Err(Error::InvalidDerivation("empty controller id".to_string()));
    }
    if path.is_empty() {
        return Err(Error::InvalidDerivation("empty derivation path".to_string()));
    }
    Ok(())
}

/// Deterministic derivation of child keys from one root key
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    root: RootPublicKey,
    scheme: DerivationScheme,
}

impl KeyDerivation {
    pub fn new(root: RootPublicKey, scheme: DerivationScheme) -> Self {
        Self { root, scheme }
    }

    pub fn root(&self) -> &RootPublicKey {
        &self.root
    }

    pub fn scheme(&self) -> DerivationScheme {
        self.scheme
    }

    /// `root + epsilon * G` and the address of the result
    pub fn derive(&self, controller_id: &str, path: &str) -> Result<DerivedKey> {
        let epsilon = derive_epsilon(self.scheme, controller_id, path)?;

        let secp = Secp256k1::verification_only();
        let public_key = self
            .root
            .public_key()
            .add_exp_tweak(&secp, &epsilon)
            .map_err(|e| {
                Error::InvalidDerivation(format!("child key is the point at infinity: {}", e))
            })?;

        let address = address_from_public_key(&public_key);

        tracing::debug!(
            controller_id,
            path,
            scheme = self.scheme.as_str(),
            address = %to_checksum(&address),
            "Derived child key"
        );

        Ok(DerivedKey {
            public_key,
            address,
        })
    }
}

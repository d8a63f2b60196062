use anyhow::{Context, Result};
use chainsig_core::pipeline::DEFAULT_SIGN_TIMEOUT;
use chainsig_core::remote_signer::{DEFAULT_SIGN_DEPOSIT, DEFAULT_SIGN_GAS};
use chainsig_core::transaction::MAX_CHAIN_ID;
use chainsig_core::{
    parse_address, ChainConfig, DerivationScheme, LocalSigner, PayloadOrder, RootPublicKey,
    SignerSettings, TransactionFormat,
};
use ethereum_types::U256;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub chain: ChainSection,
    pub derivation: DerivationConfig,
    pub signer: SignerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainSection {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Contract called by the default action
    pub target: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Wei, decimal
    #[serde(default = "default_value")]
    pub value: String,
    #[serde(default)]
    pub format: TransactionFormat,
}

impl ChainSection {
    pub fn chain_config(&self) -> Result<ChainConfig> {
        let target = parse_address(&self.target).context("Invalid [chain] target address")?;
        let value = U256::from_dec_str(&self.value)
            .map_err(|e| anyhow::anyhow!("Invalid [chain] value {}: {:?}", self.value, e))?;

        let mut config = ChainConfig::new(self.chain_id, target);
        config.method = self.method.clone();
        config.gas_limit = self.gas_limit;
        config.value = value;
        config.format = self.format;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DerivationConfig {
    /// Hex SEC1 or `secp256k1:<base58>`
    pub root_public_key: String,
    #[serde(default)]
    pub scheme: DerivationScheme,
}

impl DerivationConfig {
    pub fn root(&self) -> Result<RootPublicKey> {
        self.root_public_key
            .parse()
            .context("Invalid [derivation] root_public_key")
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    Http,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignerConfig {
    pub kind: SignerKind,
    pub contract_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub key_version: u32,
    #[serde(default)]
    pub payload_order: PayloadOrder,
    #[serde(default = "default_gas")]
    pub gas: String,
    #[serde(default = "default_deposit")]
    pub deposit: String,
    /// Root secret for `kind = "local"`, dev chains only
    #[serde(default)]
    pub local_secret_hex: Option<String>,
    /// Account the local signer signs for
    #[serde(default)]
    pub local_controller_id: Option<String>,
}

impl SignerConfig {
    pub fn settings(&self) -> SignerSettings {
        let mut settings = SignerSettings::new(self.contract_id.as_str());
        settings.key_version = self.key_version;
        settings.timeout = Duration::from_secs(self.timeout_secs);
        settings
    }

    pub fn local_signer(&self, scheme: DerivationScheme) -> Result<LocalSigner> {
        let secret = self
            .local_secret_hex
            .as_deref()
            .context("Signer kind 'local' requires local_secret_hex")?;
        let controller_id = self
            .local_controller_id
            .as_deref()
            .context("Signer kind 'local' requires local_controller_id")?;
        LocalSigner::from_hex(secret, scheme, controller_id).context("Invalid local_secret_hex")
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_method() -> String {
    chainsig_core::builder::DEFAULT_METHOD.to_string()
}

fn default_gas_limit() -> u64 {
    chainsig_core::builder::DEFAULT_GAS_LIMIT
}

fn default_value() -> String {
    "0".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_SIGN_TIMEOUT.as_secs()
}

fn default_gas() -> String {
    DEFAULT_SIGN_GAS.to_string()
}

fn default_deposit() -> String {
    DEFAULT_SIGN_DEPOSIT.to_string()
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.is_empty() {
            anyhow::bail!("[chain] rpc_url must not be empty");
        }
        if self.chain.chain_id == 0 || self.chain.chain_id > MAX_CHAIN_ID {
            anyhow::bail!(
                "[chain] chain_id must be between 1 and {}, got {}",
                MAX_CHAIN_ID,
                self.chain.chain_id
            );
        }
        if self.chain.gas_limit == 0 {
            anyhow::bail!("[chain] gas_limit must be positive");
        }
        self.chain
            .chain_config()?
            .default_action()
            .context("Invalid [chain] method")?;

        let root = self.derivation.root()?;

        if self.signer.contract_id.is_empty() {
            anyhow::bail!("[signer] contract_id must not be empty");
        }
        if self.signer.timeout_secs == 0 {
            anyhow::bail!("[signer] timeout_secs must be positive");
        }

        match self.signer.kind {
            SignerKind::Http => {
                if self.signer.url.as_deref().unwrap_or_default().is_empty() {
                    anyhow::bail!("Signer kind 'http' requires [signer] url");
                }
            }
            SignerKind::Local => {
                let signer = self.signer.local_signer(self.derivation.scheme)?;
                if signer.public_key() != *root.public_key() {
                    anyhow::bail!("local_secret_hex does not match [derivation] root_public_key");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTP_CONFIG: &str = r#"
[server]
port = 9000

[chain]
rpc_url = "https://rpc2.sepolia.org"
chain_id = 11155111
target = "0x6d454714c3Ac6D2deB4eA123254BD87DD14Fd729"

[derivation]
root_public_key = "secp256k1:2arLGgfqv9gqHGkTD9HbciC3JEuyPi9HTYJE1mHT4jxbyxRWfUDxGr2Kprad6h3WZW3wU4m11pTt2WHvr4JnaFgU"
scheme = "near-mpc-v1"

[signer]
kind = "http"
contract_id = "v2.multichain-mpc.testnet"
url = "http://127.0.0.1:3030/sign"
"#;

    const LOCAL_CONFIG: &str = r#"
[server]

[chain]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337
target = "0x6d454714c3ac6d2deb4ea123254bd87dd14fd729"
format = "legacy"
value = "1000"

[derivation]
root_public_key = "044f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa385b6b1b8ead809ca67454d9683fcf2ba03456d6fe2c4abe2b07f0fbdbb2f1c1"

[signer]
kind = "local"
contract_id = "local"
local_secret_hex = "1111111111111111111111111111111111111111111111111111111111111111"
local_controller_id = "alice.test"
"#;

    #[test]
    fn test_http_config_defaults() {
        let config = ConfigFile::parse(HTTP_CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.derivation.scheme, DerivationScheme::NearMpcV1);
        assert_eq!(config.signer.kind, SignerKind::Http);
        assert_eq!(config.signer.payload_order, PayloadOrder::Reversed);
        assert_eq!(config.signer.timeout_secs, 120);
        assert_eq!(config.signer.gas, "250000000000000");

        let chain = config.chain.chain_config().unwrap();
        assert_eq!(chain.method, "withdraw");
        assert_eq!(chain.gas_limit, 22000);
        assert!(chain.value.is_zero());
        assert_eq!(chain.format, TransactionFormat::FeeMarket);

        let settings = config.signer.settings();
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.key_version, 0);
    }

    #[test]
    fn test_local_config() {
        let config = ConfigFile::parse(LOCAL_CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.derivation.scheme, DerivationScheme::HmacSha256);
        let chain = config.chain.chain_config().unwrap();
        assert_eq!(chain.format, TransactionFormat::Legacy);
        assert_eq!(chain.value, U256::from(1000u64));
    }

    #[test]
    fn test_http_signer_requires_url() {
        let content = HTTP_CONFIG.replace("url = \"http://127.0.0.1:3030/sign\"\n", "");
        let config = ConfigFile::parse(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_secret_must_match_root() {
        let content = LOCAL_CONFIG.replace(
            "1111111111111111111111111111111111111111111111111111111111111111",
            "2222222222222222222222222222222222222222222222222222222222222222",
        );
        let config = ConfigFile::parse(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_target =
            HTTP_CONFIG.replace("0x6d454714c3Ac6D2deB4eA123254BD87DD14Fd729", "0x1234");
        assert!(ConfigFile::parse(&bad_target).unwrap().validate().is_err());

        let bad_root = HTTP_CONFIG.replace("secp256k1:2arL", "secp256k1:0OIl");
        assert!(ConfigFile::parse(&bad_root).unwrap().validate().is_err());

        let huge_chain_id = HTTP_CONFIG.replace(
            "chain_id = 11155111",
            &format!("chain_id = {}", MAX_CHAIN_ID + 1),
        );
        assert!(ConfigFile::parse(&huge_chain_id).unwrap().validate().is_err());

        let zero_chain_id = HTTP_CONFIG.replace("chain_id = 11155111", "chain_id = 0");
        assert!(ConfigFile::parse(&zero_chain_id).unwrap().validate().is_err());

        let bad_scheme = HTTP_CONFIG.replace("near-mpc-v1", "bip32");
        assert!(ConfigFile::parse(&bad_scheme).is_err());
    }
}

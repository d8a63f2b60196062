//! Minimal ABI encoder for contract calls with static arguments.
//!
//! Only what the faucet-style calls need: a method name, zero or more static
//! 32-byte arguments, and optional return types that only show up in the
//! human-readable signature.

use ethereum_types::{Address, H256, U256};

use crate::error::{Error, Result};
use crate::keccak256;

/// A static ABI value occupying one 32-byte head word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Address(Address),
    Bool(bool),
    Bytes32(H256),
}

impl AbiValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AbiValue::Uint(_) => "uint256",
            AbiValue::Address(_) => "address",
            AbiValue::Bool(_) => "bool",
            AbiValue::Bytes32(_) => "bytes32",
        }
    }

    fn encode_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            AbiValue::Uint(v) => v.to_big_endian(&mut word),
            AbiValue::Address(a) => word[12..].copy_from_slice(a.as_bytes()),
            AbiValue::Bool(b) => word[31] = u8::from(*b),
            AbiValue::Bytes32(h) => word.copy_from_slice(h.as_bytes()),
        }
        word
    }
}

/// A single-function interface plus the arguments to call it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    name: String,
    args: Vec<AbiValue>,
    returns: Vec<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self {
            name,
            args: Vec::new(),
            returns: Vec::new(),
        })
    }

    pub fn arg(mut self, value: AbiValue) -> Self {
        self.args.push(value);
        self
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.returns.push(ty.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical signature used for the selector, e.g. `withdraw()`
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.args.iter().map(AbiValue::type_name).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// e.g. `function withdraw() returns ()`
    pub fn human_readable(&self) -> String {
        format!(
            "function {} returns ({})",
            self.signature(),
            self.returns.join(",")
        )
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Selector followed by one head word per argument
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32 * self.args.len());
        data.extend_from_slice(&self.selector());
        for arg in &self.args {
            data.extend_from_slice(&arg.encode_word());
        }

        tracing::debug!(
            "{} with {} args -> 0x{}",
            self.human_readable(),
            self.args.len(),
            hex::encode(&data)
        );

        data
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars
        .next()
        .ok_or_else(|| Error::InvalidAbi("empty method name".to_string()))?;

    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return Err(Error::InvalidAbi(format!("invalid method name: {}", name)));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(Error::InvalidAbi(format!("invalid method name: {}", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_address;

    #[test]
    fn test_zero_arg_selectors() {
        let withdraw = FunctionCall::new("withdraw").unwrap();
        assert_eq!(withdraw.signature(), "withdraw()");
        assert_eq!(withdraw.encode(), hex::decode("3ccfd60b").unwrap());

        let deposit = FunctionCall::new("deposit").unwrap();
        assert_eq!(deposit.encode(), hex::decode("d0e30db0").unwrap());
    }

    #[test]
    fn test_human_readable_signature() {
        let call = FunctionCall::new("withdraw").unwrap();
        assert_eq!(call.human_readable(), "function withdraw() returns ()");

        let call = FunctionCall::new("balanceOf")
            .unwrap()
            .arg(AbiValue::Address(Address::zero()))
            .returns("uint256");
        assert_eq!(
            call.human_readable(),
            "function balanceOf(address) returns (uint256)"
        );
    }

    #[test]
    fn test_static_arguments() {
        let to = parse_address("0x3535353535353535353535353535353535353535").unwrap();
        let call = FunctionCall::new("transfer")
            .unwrap()
            .arg(AbiValue::Address(to))
            .arg(AbiValue::Uint(U256::from(1000u64)));

        let data = call.encode();
        assert_eq!(call.signature(), "transfer(address,uint256)");
        assert_eq!(&data[..4], &hex::decode("a9059cbb").unwrap()[..]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], to.as_bytes());
        assert_eq!(data[4 + 63], 0xe8);
        assert_eq!(data[4 + 62], 0x03);
    }

    #[test]
    fn test_bool_argument() {
        let call = FunctionCall::new("setPaused")
            .unwrap()
            .arg(AbiValue::Bool(true));
        let data = call.encode();
        assert_eq!(data.len(), 36);
        assert_eq!(data[35], 1);
        assert!(data[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_invalid_method_names() {
        assert!(matches!(FunctionCall::new(""), Err(Error::InvalidAbi(_))));
        assert!(matches!(
            FunctionCall::new("with draw"),
            Err(Error::InvalidAbi(_))
        ));
        assert!(matches!(
            FunctionCall::new("1withdraw"),
            Err(Error::InvalidAbi(_))
        ));
        assert!(matches!(
            FunctionCall::new("withdraw()"),
            Err(Error::InvalidAbi(_))
        ));
    }
}

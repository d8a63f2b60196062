//! Unsigned and signed EVM transactions.
//!
//! Two wire formats are supported: EIP-155 legacy transactions and EIP-1559
//! fee-market transactions (type `0x02`, empty access list).

use ethereum_types::{H256, U256};
use rlp::RlpStream;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::address::{address_from_public_key, Address};
use crate::error::{Error, Result};
use crate::keccak256;

const FEE_MARKET_TX_TYPE: u8 = 0x02;

/// Largest chain id whose EIP-155 `v` (`2 * chain_id + 36`) fits in a u64
pub const MAX_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionFormat {
    Legacy,
    #[default]
    FeeMarket,
}

impl TransactionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionFormat::Legacy => "legacy",
            TransactionFormat::FeeMarket => "fee-market",
        }
    }
}

/// Fee shape; the variant decides the transaction format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeFields {
    Legacy {
        gas_price: U256,
    },
    FeeMarket {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub fees: FeeFields,
}

impl UnsignedTransaction {
    pub fn format(&self) -> TransactionFormat {
        match self.fees {
            FeeFields::Legacy { .. } => TransactionFormat::Legacy,
            FeeFields::FeeMarket { .. } => TransactionFormat::FeeMarket,
        }
    }

    /// Bytes that get hashed for signing
    pub fn signing_preimage(&self) -> Vec<u8> {
        match self.fees {
            FeeFields::Legacy { gas_price } => {
                // EIP-155: [nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                self.append_legacy_fields(&mut stream, gas_price);
                stream.append(&self.chain_id);
                stream.append(&0u8);
                stream.append(&0u8);
                stream.out().to_vec()
            }
            FeeFields::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                self.append_fee_market_fields(
                    &mut stream,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                );
                typed_envelope(stream)
            }
        }
    }

    pub fn signing_hash(&self) -> H256 {
        H256(keccak256(&self.signing_preimage()))
    }

    /// Recovery parameter written on the wire for recovery id 0 or 1
    pub fn v_for_recovery_id(&self, recovery_id: u8) -> Result<u64> {
        match self.format() {
            TransactionFormat::Legacy => Ok(eip155_base(self.chain_id)? + u64::from(recovery_id)),
            TransactionFormat::FeeMarket => Ok(u64::from(recovery_id)),
        }
    }

    fn append_legacy_fields(&self, stream: &mut RlpStream, gas_price: U256) {
        stream.append(&self.nonce);
        stream.append(&gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to);
        stream.append(&self.value);
        stream.append(&self.data);
    }

    fn append_fee_market_fields(
        &self,
        stream: &mut RlpStream,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    ) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&max_priority_fee_per_gas);
        stream.append(&max_fee_per_gas);
        stream.append(&self.gas_limit);
        stream.append(&self.to);
        stream.append(&self.value);
        stream.append(&self.data);
        // Access list
        stream.begin_list(0);
    }
}

/// `2 * chain_id + 35`, the EIP-155 `v` for recovery id 0
fn eip155_base(chain_id: u64) -> Result<u64> {
    if chain_id > MAX_CHAIN_ID {
        return Err(Error::InvalidTransaction(format!(
            "chain id {} exceeds {}",
            chain_id, MAX_CHAIN_ID
        )));
    }
    Ok(chain_id * 2 + 35)
}

fn typed_envelope(stream: RlpStream) -> Vec<u8> {
    let body = stream.out();
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(FEE_MARKET_TX_TYPE);
    out.extend_from_slice(&body);
    out
}

/// An unsigned transaction plus the `(r, s, v)` that authorises it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    pub r: U256,
    pub s: U256,
    /// EIP-155 `v` for legacy, y-parity for fee-market
    pub v: u64,
}

impl SignedTransaction {
    /// Raw bytes for `eth_sendRawTransaction`
    pub fn encode(&self) -> Vec<u8> {
        let tx = &self.transaction;
        match tx.fees {
            FeeFields::Legacy { gas_price } => {
                let mut stream = RlpStream::new();
                stream.begin_list(9);
                tx.append_legacy_fields(&mut stream, gas_price);
                stream.append(&self.v);
                stream.append(&self.r);
                stream.append(&self.s);
                stream.out().to_vec()
            }
            FeeFields::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut stream = RlpStream::new();
                stream.begin_list(12);
                tx.append_fee_market_fields(&mut stream, max_fee_per_gas, max_priority_fee_per_gas);
                stream.append(&self.v);
                stream.append(&self.r);
                stream.append(&self.s);
                typed_envelope(stream)
            }
        }
    }

    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    pub fn tx_hash(&self) -> H256 {
        H256(keccak256(&self.encode()))
    }

    pub fn recovery_id(&self) -> Result<u8> {
        let tx = &self.transaction;
        let id = match tx.format() {
            TransactionFormat::Legacy => self
                .v
                .checked_sub(eip155_base(tx.chain_id)?)
                .ok_or_else(|| Error::InvalidTransaction(format!("bad EIP-155 v: {}", self.v)))?,
            TransactionFormat::FeeMarket => self.v,
        };
        match id {
            0 | 1 => Ok(id as u8),
            _ => Err(Error::InvalidTransaction(format!(
                "v {} out of range for {}",
                self.v,
                tx.format().as_str()
            ))),
        }
    }

    /// 64-byte `r || s`
    pub fn compact_signature(&self) -> [u8; 64] {
        let mut compact = [0u8; 64];
        self.r.to_big_endian(&mut compact[..32]);
        self.s.to_big_endian(&mut compact[32..]);
        compact
    }

    /// Public key that produced this signature over the signing hash
    pub fn recover_public_key(&self) -> Result<PublicKey> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.recovery_id()?))
            .map_err(|e| Error::InvalidTransaction(e.to_string()))?;
        let signature = RecoverableSignature::from_compact(&self.compact_signature(), recovery_id)
            .map_err(|e| Error::InvalidTransaction(e.to_string()))?;
        let message = Message::from_digest(self.transaction.signing_hash().0);

        Secp256k1::verification_only()
            .recover_ecdsa(&message, &signature)
            .map_err(|e| Error::InvalidTransaction(format!("recovery failed: {}", e)))
    }

    pub fn recover_sender(&self) -> Result<Address> {
        Ok(address_from_public_key(&self.recover_public_key()?))
    }

    /// Plain ECDSA verification against `public_key`; high-s fails
    pub fn verify(&self, public_key: &PublicKey) -> Result<()> {
        let signature = Signature::from_compact(&self.compact_signature())
            .map_err(|e| Error::SignatureInvalid(e.to_string()))?;
        let message = Message::from_digest(self.transaction.signing_hash().0);

        Secp256k1::verification_only()
            .verify_ecdsa(&message, &signature, public_key)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{parse_address, to_checksum};

    fn eip155_example() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            nonce: 9,
            to: parse_address("0x3535353535353535353535353535353535353535").unwrap(),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
            gas_limit: 21000,
            fees: FeeFields::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            },
        }
    }

    fn withdraw_tx(fees: FeeFields, nonce: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 11155111,
            nonce,
            to: parse_address("0x6d454714c3Ac6D2deB4eA123254BD87DD14Fd729").unwrap(),
            value: U256::zero(),
            data: hex::decode("3ccfd60b").unwrap(),
            gas_limit: 22000,
            fees,
        }
    }

    fn u256_hex(s: &str) -> U256 {
        U256::from_big_endian(&hex::decode(s).unwrap())
    }

    #[test]
    fn test_eip155_signing_hash() {
        let tx = eip155_example();
        assert_eq!(tx.format(), TransactionFormat::Legacy);
        assert_eq!(
            hex::encode(tx.signing_preimage()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let signed = SignedTransaction {
            transaction: eip155_example(),
            r: U256::from_dec_str(
                "18515461264373351373200002665853028612451056578545711640558177340181847433846",
            )
            .unwrap(),
            s: U256::from_dec_str(
                "46948507304638947509940763649030358759909902576025900602547168820602576006531",
            )
            .unwrap(),
            v: 37,
        };

        assert_eq!(
            hex::encode(signed.encode()),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(
            hex::encode(signed.tx_hash()),
            "33469b22e9f636356c4160a87eb19df52b7412e8eac32a4a55ffe88ea8350788"
        );
        assert_eq!(signed.recovery_id().unwrap(), 0);
        assert_eq!(
            to_checksum(&signed.recover_sender().unwrap()),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"
        );
    }

    #[test]
    fn test_fee_market_withdraw() {
        let tx = withdraw_tx(
            FeeFields::FeeMarket {
                max_fee_per_gas: U256::from(30_000_000_000u64),
                max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            },
            0,
        );
        assert_eq!(
            hex::encode(tx.signing_preimage()),
            "02ef83aa36a7808459682f008506fc23ac008255f0946d454714c3ac6d2deb4ea123254bd87dd14fd72980843ccfd60bc0"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "64c0ae31c712e02722ce85e554d1c89d4070e750835f65ae384ec626baf5a570"
        );

        let signed = SignedTransaction {
            transaction: tx,
            r: u256_hex("b85f1639d11052bda2973f1bd2df89e252642bfb26f3f4cd96fbef27f4cfdcd1"),
            s: u256_hex("23f8c277c9696fb103c42c0d6042239834c5d2d11a2ae8f7e12bd201c5b83e66"),
            v: 1,
        };
        assert_eq!(
            hex::encode(signed.encode()),
            "02f87283aa36a7808459682f008506fc23ac008255f0946d454714c3ac6d2deb4ea123254bd87dd14fd72980843ccfd60bc001a0b85f1639d11052bda2973f1bd2df89e252642bfb26f3f4cd96fbef27f4cfdcd1a023f8c277c9696fb103c42c0d6042239834c5d2d11a2ae8f7e12bd201c5b83e66"
        );
        assert_eq!(
            hex::encode(signed.tx_hash()),
            "73f093a7de61ce4632124fa2a7c824dd38c16fa2eeb1760313404c63a9924b0c"
        );
        assert_eq!(
            to_checksum(&signed.recover_sender().unwrap()),
            "0xDe0d1E9eB30dDA375F70005Ee6F750ff5Ed80eb9"
        );
        let public_key = signed.recover_public_key().unwrap();
        signed.verify(&public_key).unwrap();
    }

    #[test]
    fn test_legacy_withdraw_with_large_chain_id() {
        let tx = withdraw_tx(
            FeeFields::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            },
            3,
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "cca4995fc3641b42bf2cba1ad9bc06703631a9677657cd3053f30c0aa3f24e80"
        );
        assert_eq!(tx.v_for_recovery_id(0).unwrap(), 22310257);
        assert_eq!(tx.v_for_recovery_id(1).unwrap(), 22310258);

        let signed = SignedTransaction {
            transaction: tx,
            r: u256_hex("edfc9cb5270ac4e5feefb4b036c1d27c466d85edbbb8a079d1c1127562608e7d"),
            s: u256_hex("591f64dad54c8d016493dda13755b5ffc78a2c98f64ae7ff34ae8eec1c48fc67"),
            v: 22310257,
        };
        assert_eq!(
            hex::encode(signed.encode()),
            "f86c038504a817c8008255f0946d454714c3ac6d2deb4ea123254bd87dd14fd72980843ccfd60b8401546d71a0edfc9cb5270ac4e5feefb4b036c1d27c466d85edbbb8a079d1c1127562608e7da0591f64dad54c8d016493dda13755b5ffc78a2c98f64ae7ff34ae8eec1c48fc67"
        );
        assert_eq!(
            hex::encode(signed.tx_hash()),
            "6c9fb0cb5de578346a693999c5c455e8028b76d83c6070a763c118c8f98a51be"
        );
        assert_eq!(
            to_checksum(&signed.recover_sender().unwrap()),
            "0xDe0d1E9eB30dDA375F70005Ee6F750ff5Ed80eb9"
        );
    }

    #[test]
    fn test_recovery_id_out_of_range() {
        let mut signed = SignedTransaction {
            transaction: eip155_example(),
            r: U256::one(),
            s: U256::one(),
            v: 27,
        };
        assert!(matches!(
            signed.recovery_id(),
            Err(Error::InvalidTransaction(_))
        ));

        signed.v = 39;
        assert!(signed.recovery_id().is_err());
    }

    #[test]
    fn test_chain_id_overflow_is_rejected() {
        let mut tx = withdraw_tx(
            FeeFields::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            },
            0,
        );

        tx.chain_id = MAX_CHAIN_ID;
        assert_eq!(tx.v_for_recovery_id(1).unwrap(), u64::MAX - 1);

        tx.chain_id = u64::MAX / 2 + 1;
        assert!(matches!(
            tx.v_for_recovery_id(0),
            Err(Error::InvalidTransaction(_))
        ));

        let signed = SignedTransaction {
            transaction: tx,
            r: U256::one(),
            s: U256::one(),
            v: 37,
        };
        assert!(matches!(
            signed.recovery_id(),
            Err(Error::InvalidTransaction(_))
        ));
    }
}

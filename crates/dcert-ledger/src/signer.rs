//! # Transaction Signing
//!
//! The service holds one secp256k1 key. Every registry write is signed
//! here as an EIP-155 legacy transaction and submitted with
//! `eth_sendRawTransaction`, so the node never needs an unlocked account.
//!
//! ## Security Invariant
//!
//! The key is loaded from hex once at start-up; the decoded copy is
//! zeroized and the `Debug` impl prints only the derived address.

use dcert_core::Bytes32;
use dcert_crypto::keccak::keccak256;
use k256::ecdsa::SigningKey;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::abi;
use crate::fee::Wei;

/// Errors from loading a key or signing a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing key must be 32 bytes of hex")]
    InvalidKeyEncoding,
    #[error("signing key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("signing failed: {0}")]
    Signing(String),
}

/// The service's transaction signer.
#[derive(Clone)]
pub struct TxSigner {
    key: SigningKey,
    address: [u8; 20],
}

impl std::fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &self.address())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TxSigner {
    /// Load a key from 64 hex digits, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        let secret = secret.trim();
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        if digits.len() != 64 {
            return Err(SignerError::InvalidKeyEncoding);
        }
        let bytes = Zeroizing::new(
            abi::from_hex(&format!("0x{digits}")).map_err(|_| SignerError::InvalidKeyEncoding)?,
        );
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        // uncompressed SEC1: 0x04 || X || Y
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..]);
        Self { key, address }
    }

    /// Sender address derived from the public key, lowercase `0x` hex.
    pub fn address(&self) -> String {
        abi::to_hex(&self.address)
    }

    /// Sign `tx` for `chain_id` and return the raw transaction bytes.
    pub fn sign(&self, tx: &LegacyTx, chain_id: u64) -> Result<SignedTx, SignerError> {
        let sighash = tx.signing_hash(chain_id);
        let (signature, recovery) = self
            .key
            .sign_prehash_recoverable(sighash.as_bytes())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let rs = signature.to_bytes();
        let v = u128::from(recovery.to_byte()) + u128::from(chain_id) * 2 + 35;

        let raw = rlp::list(&[
            rlp::uint(u128::from(tx.nonce)),
            rlp::uint(tx.gas_price.0),
            rlp::uint(u128::from(tx.gas)),
            rlp::bytes(&tx.to),
            rlp::uint(tx.value.0),
            rlp::bytes(&tx.data),
            rlp::uint(v),
            rlp::bytes(rlp::trim_leading_zeros(&rs[..32])),
            rlp::bytes(rlp::trim_leading_zeros(&rs[32..])),
        ]);
        Ok(SignedTx {
            hash: keccak256(&raw),
            raw,
        })
    }
}

/// A pre-London (`gasPrice`) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: Wei,
    pub gas: u64,
    pub to: [u8; 20],
    pub value: Wei,
    pub data: Vec<u8>,
}

impl LegacyTx {
    /// EIP-155 signing hash: `keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0]))`.
    pub fn signing_hash(&self, chain_id: u64) -> Bytes32 {
        keccak256(&rlp::list(&[
            rlp::uint(u128::from(self.nonce)),
            rlp::uint(self.gas_price.0),
            rlp::uint(u128::from(self.gas)),
            rlp::bytes(&self.to),
            rlp::uint(self.value.0),
            rlp::bytes(&self.data),
            rlp::uint(u128::from(chain_id)),
            rlp::uint(0),
            rlp::uint(0),
        ]))
    }
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    /// Transaction hash, known before submission.
    pub hash: Bytes32,
}

/// Parse a `0x` + 40 hex digit address.
pub fn parse_address(s: &str) -> Option<[u8; 20]> {
    let bytes = abi::from_hex(s).ok()?;
    bytes.try_into().ok()
}

/// Recursive-length-prefix encoding, only the subset transactions need.
mod rlp {
    pub(super) fn trim_leading_zeros(b: &[u8]) -> &[u8] {
        let start = b.iter().position(|&x| x != 0).unwrap_or(b.len());
        &b[start..]
    }

    /// Scalar: minimal big-endian bytes, zero is the empty string.
    pub(super) fn uint(n: u128) -> Vec<u8> {
        bytes(trim_leading_zeros(&n.to_be_bytes()))
    }

    pub(super) fn bytes(b: &[u8]) -> Vec<u8> {
        if b.len() == 1 && b[0] < 0x80 {
            return b.to_vec();
        }
        let mut out = header(0x80, b.len());
        out.extend_from_slice(b);
        out
    }

    pub(super) fn list(items: &[Vec<u8>]) -> Vec<u8> {
        let payload: Vec<u8> = items.concat();
        let mut out = header(0xc0, payload.len());
        out.extend(payload);
        out
    }

    fn header(offset: u8, len: usize) -> Vec<u8> {
        if len < 56 {
            return vec![offset + len as u8];
        }
        let len_bytes = (len as u64).to_be_bytes();
        let len_bytes = trim_leading_zeros(&len_bytes);
        let mut out = vec![offset + 55 + len_bytes.len() as u8];
        out.extend_from_slice(len_bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    // Transaction and key from the EIP-155 worked example.
    const EIP155_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    fn eip155_tx() -> LegacyTx {
        LegacyTx {
            nonce: 9,
            gas_price: Wei(20_000_000_000),
            gas: 21_000,
            to: [0x35; 20],
            value: Wei(1_000_000_000_000_000_000),
            data: Vec::new(),
        }
    }

    #[test]
    fn address_is_derived_from_key() {
        let signer = TxSigner::from_hex(EIP155_KEY).unwrap();
        assert_eq!(signer.address(), "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f");
    }

    #[test]
    fn signing_hash_matches_eip155_example() {
        assert_eq!(
            eip155_tx().signing_hash(1).to_hex(),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signed_tx_recovers_to_sender() {
        let signer = TxSigner::from_hex(EIP155_KEY).unwrap();
        let tx = eip155_tx();
        let signed = signer.sign(&tx, 1).unwrap();

        // list header (short form, one length byte), then the unsigned fields
        let fields = "098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080";
        let hex = abi::to_hex(&signed.raw);
        assert_eq!(&hex[2..4], "f8");
        assert_eq!(usize::from(signed.raw[1]), signed.raw.len() - 2);
        assert!(hex[6..].starts_with(fields));
        assert_eq!(signed.hash, keccak256(&signed.raw));

        // v (one byte, 37 or 38 on chain 1), then r and s as byte strings
        let mut rest = &signed.raw[2 + fields.len() / 2..];
        let v = rest[0];
        assert!(v == 37 || v == 38, "v = {v}");
        rest = &rest[1..];
        let mut rs = [0u8; 64];
        for half in 0..2 {
            let len = usize::from(rest[0] - 0x80);
            rs[half * 32 + 32 - len..half * 32 + 32].copy_from_slice(&rest[1..=len]);
            rest = &rest[1 + len..];
        }
        assert!(rest.is_empty());
        let signature = Signature::from_slice(&rs).unwrap();
        let recovery = RecoveryId::from_byte(v - 37).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(
            tx.signing_hash(1).as_bytes(),
            &signature,
            recovery,
        )
        .unwrap();
        assert_eq!(&recovered, signer.key.verifying_key());
    }

    #[test]
    fn key_accepts_bare_hex_and_rejects_garbage() {
        assert!(TxSigner::from_hex(&EIP155_KEY[2..]).is_ok());
        assert_eq!(
            TxSigner::from_hex("0x1234").unwrap_err(),
            SignerError::InvalidKeyEncoding
        );
        assert_eq!(
            TxSigner::from_hex(&format!("0x{}", "0".repeat(64))).unwrap_err(),
            SignerError::InvalidKey
        );
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", TxSigner::from_hex(EIP155_KEY).unwrap());
        assert!(!dbg.contains("4646464646"));
        assert!(dbg.contains("9d8a62f6"));
    }

    #[test]
    fn rlp_encodes_long_strings_and_zero() {
        assert_eq!(rlp::uint(0), vec![0x80]);
        assert_eq!(rlp::uint(0x7f), vec![0x7f]);
        assert_eq!(rlp::uint(0x80), vec![0x81, 0x80]);
        let long = rlp::bytes(&[0xaa; 60]);
        assert_eq!(&long[..2], &[0xb8, 60]);
        assert_eq!(long.len(), 62);
    }
}

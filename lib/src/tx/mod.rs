// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction model, signing orchestration and submission
//!
//! Transactions are Solana-style, a message signed by an ordered set of
//! required signers. Prepared transactions carry per-signer capability
//! classes used by the [Orchestrator] to route signing requests.

use std::{fmt::Display, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::Error;

mod orchestrator;
pub use orchestrator::{BatchSigner, NfcSigner, Orchestrator, Progress, Submission, SIGNING_ORDER};

mod submit;
pub use submit::{BundleRelay, BundleStatus, Commitment, Rpc, SignatureStatus, Submitter};

/// Base58 key / signature parse errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("Invalid length (expected {expected}, got {actual})")]
    Length { expected: usize, actual: usize },
}

fn decode_b58<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let v = bs58::decode(s).into_vec()?;

    <[u8; N]>::try_from(v.as_slice()).map_err(|_| ParseError::Length {
        expected: N,
        actual: v.len(),
    })
}

/// Ed25519 public key, rendered as base58
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey(pub [u8; 32]);

impl Display for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl std::fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl FromStr for Pubkey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_b58(s).map(Self)
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(b: [u8; 32]) -> Self {
        Self(b)
    }
}

/// Ed25519 signature, rendered as base58
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl FromStr for Signature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_b58(s).map(Self)
    }
}

impl From<[u8; 64]> for Signature {
    fn from(b: [u8; 64]) -> Self {
        Self(b)
    }
}

/// Unsigned or partially signed transaction
///
/// The message is fixed at construction, only signatures may be added.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    signer_keys: Vec<Pubkey>,
    signatures: Vec<Option<Signature>>,
    message: Vec<u8>,
}

impl Transaction {
    /// Create a transaction with the provided required signers and message
    pub fn new(signer_keys: Vec<Pubkey>, message: Vec<u8>) -> Self {
        Self {
            signatures: vec![None; signer_keys.len()],
            signer_keys,
            message,
        }
    }

    /// Required signer keys, in signature slot order
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.signer_keys
    }

    /// Message bytes to be signed
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Signature slots
    pub fn signatures(&self) -> &[Option<Signature>] {
        &self.signatures
    }

    /// Apply a signature to the slot for the provided signer
    pub fn add_signature(&mut self, key: &Pubkey, signature: Signature) -> Result<(), Error> {
        let i = self
            .signer_keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| Error::Collaborator(format!("{key} is not a required signer")))?;

        self.signatures[i] = Some(signature);

        Ok(())
    }

    /// Check at least one signature has been applied
    pub fn is_signed(&self) -> bool {
        self.signatures.iter().any(|s| s.is_some())
    }

    /// First (fee payer) signature, used as the transaction identifier
    pub fn first_signature(&self) -> Option<Signature> {
        self.signatures.first().copied().flatten()
    }

    /// Serialize to wire format,
    /// `compact-u16(n) | n * 64-byte signature | message`
    pub fn serialize(&self) -> Vec<u8> {
        let mut buff = Vec::with_capacity(3 + self.signatures.len() * 64 + self.message.len());

        encode_compact_u16(self.signatures.len() as u16, &mut buff);

        for s in &self.signatures {
            match s {
                Some(s) => buff.extend_from_slice(&s.0),
                None => buff.extend_from_slice(&[0u8; 64]),
            }
        }

        buff.extend_from_slice(&self.message);

        buff
    }

    /// Serialize and base64 encode for submission
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.serialize())
    }
}

/// Write a compact-u16 (7 bits per byte, continuation high bit)
pub fn encode_compact_u16(mut v: u16, buff: &mut Vec<u8>) {
    loop {
        let b = (v & 0x7f) as u8;
        v >>= 7;

        if v == 0 {
            buff.push(b);
            return;
        }

        buff.push(b | 0x80);
    }
}

/// Signer capability classes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum SignerKind {
    /// Key held on the local device
    Device,
    /// Remote cloud / passkey backed key
    Cloud,
    /// Key held in the NFC secure element
    Nfc,
    /// Unrecognised signer
    Unknown,
}

/// Per-signer signing state
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum SignState {
    Unsigned,
    Signed,
    Error,
}

/// Required signer for a prepared transaction
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionSigner {
    pub key: Pubkey,
    pub kind: SignerKind,
    pub state: SignState,
}

impl TransactionSigner {
    /// Create a new unsigned signer entry
    pub fn new(key: Pubkey, kind: SignerKind) -> Self {
        Self {
            key,
            kind,
            state: SignState::Unsigned,
        }
    }
}

/// Transaction prepared for signing
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedTransaction {
    pub id: String,
    pub fee_payer: Pubkey,
    pub signers: Vec<TransactionSigner>,
    pub transaction: Transaction,
}

impl PreparedTransaction {
    /// Prepare a transaction for the provided signers
    ///
    /// The fee payer must be one of `signers` and takes the first signature
    /// slot, remaining slots follow `signers` order.
    pub fn new(
        id: impl Into<String>,
        fee_payer: Pubkey,
        signers: Vec<TransactionSigner>,
        message: Vec<u8>,
    ) -> Result<Self, Error> {
        if !signers.iter().any(|s| s.key == fee_payer) {
            return Err(Error::FeePayer(fee_payer.to_string()));
        }

        let mut keys = vec![fee_payer];
        for s in &signers {
            if !keys.contains(&s.key) {
                keys.push(s.key);
            }
        }

        Ok(Self {
            id: id.into(),
            fee_payer,
            signers,
            transaction: Transaction::new(keys, message),
        })
    }
}

/// Signing request issued to a [BatchSigner]
#[derive(Clone, Debug, PartialEq)]
pub struct SignRequest {
    pub transaction_id: String,
    pub signer: Pubkey,
    pub message: Vec<u8>,
}

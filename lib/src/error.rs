// Copyright (c) 2022-2023 The MobileCoin Foundation

use nfc_wallet_apdu::ApduError;
use tokio::time::error::Elapsed;

use crate::{transport::TransportError, tx::SignerKind};

/// NFC wallet API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session cancelled by the user (or via [close][crate::SecureElement::close])
    #[error("Operation cancelled by user")]
    UserCancelled,

    /// A secure element session is already active
    #[error("Secure element session already in progress")]
    Busy,

    /// Underlying transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-success status word returned by the card
    #[error("Card communication failed (status: {0:#06x})")]
    Status(u16),

    /// Timeout waiting for a card response
    #[error("Timeout waiting for card response")]
    RequestTimeout,

    /// Wallet applet could not be selected
    #[error("Applet selection failed")]
    AppletSelection,

    /// Card returned data that could not be trusted
    #[error("Trust check failed: {0}")]
    Trust(Violation),

    /// Message exceeds the maximum signing payload
    #[error("Message too large for signing ({0} bytes)")]
    SizeLimitExceeded(usize),

    /// Malformed APDU or response
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    /// Transaction signer with unknown capability
    #[error("Unknown signer type for {0}")]
    UnknownSigner(String),

    /// No collaborator registered for a signer class
    #[error("No signer available for {0} keys")]
    NoSigner(SignerKind),

    /// Collaborating signer failed
    #[error("Signer failed: {0}")]
    Collaborator(String),

    /// Fee payer is not one of the transaction signers
    #[error("Fee payer {0} is not a required signer")]
    FeePayer(String),

    /// Submission requested for an empty batch
    #[error("No transactions to submit")]
    EmptyBatch,

    /// Transaction has no signatures applied
    #[error("Transaction {0} is missing signatures")]
    MissingSignature(String),

    /// RPC or network failure (transient)
    #[error("Network error: {0}")]
    Network(String),

    /// Transaction rejected on submission
    #[error("Send transaction failed: {0}")]
    SendTransaction(String),

    /// Transaction landed with an on-chain error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bundle reported as failed by the relay
    #[error("Bundle {0} failed")]
    BundleFailed(String),

    /// Confirmation not observed within the polling window
    #[error("Timeout waiting for confirmation")]
    ConfirmationTimeout,
}

/// Trust violations detected while verifying card responses
#[derive(Copy, Clone, Debug, PartialEq, strum::Display)]
pub enum Violation {
    /// Attestation signature did not verify
    #[strum(serialize = "attestation signature invalid")]
    Attestation,

    /// Attestation key is not self-consistent
    #[strum(serialize = "attestation key invalid")]
    AttestationKey,

    /// Response does not echo the request challenge
    #[strum(serialize = "stale attestation challenge")]
    Challenge,

    /// Address object has an unexpected class
    #[strum(serialize = "invalid object class")]
    ObjectClass,

    /// Address object was not generated on the card
    #[strum(serialize = "invalid object origin")]
    Origin,

    /// Address object is an authentication object
    #[strum(serialize = "invalid authentication indicator")]
    AuthIndicator,

    /// Address object policy mismatch
    #[strum(serialize = "invalid address policy")]
    AddressPolicy,

    /// Asset object policy mismatch
    #[strum(serialize = "invalid asset policy")]
    AssetPolicy,

    /// Asset stored for a different chain
    #[strum(serialize = "invalid asset chain")]
    ChainTag,

    /// Key self-test signature did not verify
    #[strum(serialize = "unable to verify key's signature")]
    KeySignature,

    /// Returned signature does not match the requested signer
    #[strum(serialize = "signature does not match signer")]
    SignerMismatch,
}

impl Error {
    /// Check whether this error resulted from user cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::UserCancelled | Error::Transport(TransportError::Cancelled)
        )
    }

    /// Check whether the operation may be retried during submission
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::SendTransaction(_) | Error::TransactionFailed(_) | Error::BundleFailed(_)
        )
    }
}

impl From<Violation> for Error {
    fn from(v: Violation) -> Self {
        Error::Trust(v)
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}

#[cfg(feature = "rpc")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Network(format!("invalid response: {e}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retryable() {
        assert!(Error::Network("oops".to_string()).is_retryable());
        assert!(Error::ConfirmationTimeout.is_retryable());
        assert!(!Error::SendTransaction("rejected".to_string()).is_retryable());
        assert!(!Error::TransactionFailed("InstructionError".to_string()).is_retryable());
    }

    #[test]
    fn display() {
        assert_eq!(
            Error::Trust(Violation::KeySignature).to_string(),
            "Trust check failed: unable to verify key's signature"
        );
        assert_eq!(
            Error::Status(0x6a82).to_string(),
            "Card communication failed (status: 0x6a82)"
        );
    }
}

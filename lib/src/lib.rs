// Copyright (c) 2022-2023 The MobileCoin Foundation

//! NFC Secure Element Wallet API Library (and CLI)
//!
//! This provides a [SecureElement] handle for reading (and provisioning)
//! wallet addresses from NFC secure elements and signing with on-card keys,
//! as well as an [Orchestrator][tx::Orchestrator] for signing transactions
//! across device, cloud and NFC signers and submitting the results.
//!

use std::ffi::CString;

/// Re-export transports for consumer use
pub mod transport;
use transport::*;

/// Re-export `nfc-wallet-apdu` for consumers
pub use nfc_wallet_apdu::{self as apdu};

pub mod attestation;

mod channel;
pub use channel::{SecureChannel, Session};

pub mod config;

mod error;
pub use error::{Error, Violation};

pub mod event;

mod handle;
pub use handle::{
    read_attestation_key, read_attested, read_or_provision, select, sign_message, AttestedObject,
    SecureElement, SecureElementData,
};

#[cfg(feature = "rpc")]
pub mod rpc;

pub mod tx;

/// NFC provider manages reader discovery and connections
#[derive(Debug, Default)]
pub struct NfcProvider {}

/// Reader discovery filter
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// List all readers available using supported transports
    Any,
    /// List only PC/SC readers
    Pcsc,
    /// List only TCP (simulator) readers
    Tcp,
}

/// Reader information for listing, used by connect
#[derive(Clone, Debug)]
pub enum ReaderInfo {
    Pcsc(CString),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpOptions),
}

impl NfcProvider {
    /// Create a new NFC provider
    pub fn new() -> Self {
        Self {}
    }

    /// List available readers
    pub async fn list_readers(&self, filter: Filter) -> Vec<ReaderInfo> {
        let mut readers = vec![];

        #[cfg(feature = "transport_pcsc")]
        if filter == Filter::Any || filter == Filter::Pcsc {
            match PcscTransport::list_readers() {
                Ok(r) => readers.extend(r.into_iter().map(ReaderInfo::Pcsc)),
                Err(e) => log::debug!("PC/SC unavailable: {}", e),
            }
        }

        #[cfg(feature = "transport_tcp")]
        if filter == Filter::Any || filter == Filter::Tcp {
            // Try connecting to the default simulator port
            let o = TcpOptions::default();
            if let Ok(_t) = tokio::net::TcpStream::connect(o.socket_addr()).await {
                readers.push(ReaderInfo::Tcp(o));
            };
        }

        log::debug!("Found {} readers: {:?}", readers.len(), readers);

        readers
    }

    /// Connect to the specified reader
    pub fn connect(&self, info: &ReaderInfo) -> Result<GenericElement, Error> {
        let t = match info {
            #[cfg(feature = "transport_pcsc")]
            ReaderInfo::Pcsc(name) => GenericTransport::Pcsc(PcscTransport::new(name)?),
            #[cfg(feature = "transport_tcp")]
            ReaderInfo::Tcp(opts) => GenericTransport::Tcp(TcpTransport::new(opts.clone())),
            #[allow(unreachable_patterns)]
            _ => return Err(TransportError::Unsupported.into()),
        };

        Ok(SecureElement::from(t))
    }
}

/// Generic secure element handle (abstract over transport types)
pub type GenericElement = SecureElement<GenericTransport>;

impl GenericElement {
    /// Create a new generic secure element handle
    pub fn new(t: impl Into<GenericTransport>) -> Self {
        Self::from(t.into())
    }
}

impl std::fmt::Display for ReaderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderInfo::Pcsc(name) => write!(f, "{:32} (PC/SC)", name.to_string_lossy()),
            #[cfg(feature = "transport_tcp")]
            ReaderInfo::Tcp(o) => write!(f, "{:32} (TCP, {}:{})", "Simulator", o.addr, o.port),
        }
    }
}

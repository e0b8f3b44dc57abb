// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport abstraction for secure element communication
//!
//! Transports move raw command APDUs to a card and return the raw response
//! (data followed by the status word). Session handling, timeouts and status
//! checking are layered on top by [SecureChannel][crate::SecureChannel].

use async_trait::async_trait;
use strum::Display;

#[cfg(feature = "transport_pcsc")]
mod pcsc;
#[cfg(feature = "transport_pcsc")]
pub use self::pcsc::PcscTransport;

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::{TcpOptions, TcpTransport};

/// Raw APDU transport
#[async_trait]
pub trait Transport: Send {
    /// Wait for a card to be presented and open a connection
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Exchange a raw APDU, returning response data with the status word
    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the card connection, must be safe to call when not connected
    fn disconnect(&mut self);
}

/// Run a blocking reader call on the blocking thread pool, leaving the
/// calling task free to observe timeouts and cancellation
#[cfg_attr(not(feature = "transport_pcsc"), allow(dead_code))]
pub(crate) async fn blocking<F, R>(f: F) -> Result<R, TransportError>
where
    F: FnOnce() -> Result<R, TransportError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::from)?
}

/// Transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// NFC is not supported or not enabled on this host
    #[error("NFC unavailable")]
    Unsupported,

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// No card connected
    #[error("No card connected")]
    NoCard,

    /// Malformed response from the card or reader
    #[error("Invalid response")]
    InvalidResponse,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PC/SC error
    #[cfg(feature = "transport_pcsc")]
    #[error("PC/SC error: {0}")]
    Pcsc(::pcsc::Error),
}

#[cfg(feature = "transport_pcsc")]
impl From<::pcsc::Error> for TransportError {
    fn from(e: ::pcsc::Error) -> Self {
        match e {
            ::pcsc::Error::Cancelled => TransportError::Cancelled,
            ::pcsc::Error::NoService | ::pcsc::Error::NoReadersAvailable => {
                TransportError::Unsupported
            }
            ::pcsc::Error::RemovedCard | ::pcsc::Error::NoSmartcard => TransportError::NoCard,
            _ => TransportError::Pcsc(e),
        }
    }
}

/// Generic transport (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_pcsc")]
    Pcsc(PcscTransport),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpTransport),
}

/// Convert a PC/SC transport into a generic transport
#[cfg(feature = "transport_pcsc")]
impl From<PcscTransport> for GenericTransport {
    fn from(t: PcscTransport) -> Self {
        Self::Pcsc(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TcpTransport> for GenericTransport {
    fn from(t: TcpTransport) -> Self {
        Self::Tcp(t)
    }
}

/// Implementation of [Transport] for [GenericTransport], dispatching to the
/// underlying transport
#[async_trait]
impl Transport for GenericTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "transport_pcsc")]
            Self::Pcsc(t) => t.connect().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.connect().await,
            #[cfg(not(all(feature = "transport_pcsc", feature = "transport_tcp")))]
            _ => Err(TransportError::Unsupported),
        }
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self {
            #[cfg(feature = "transport_pcsc")]
            Self::Pcsc(t) => t.exchange(apdu).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.exchange(apdu).await,
            #[cfg(not(all(feature = "transport_pcsc", feature = "transport_tcp")))]
            _ => Err(TransportError::Unsupported),
        }
    }

    fn disconnect(&mut self) {
        match self {
            #[cfg(feature = "transport_pcsc")]
            Self::Pcsc(t) => t.disconnect(),
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.disconnect(),
            #[cfg(not(all(feature = "transport_pcsc", feature = "transport_tcp")))]
            _ => (),
        }
    }
}

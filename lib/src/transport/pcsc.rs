// Copyright (c) 2022-2023 The MobileCoin Foundation

//! PC/SC contactless reader transport

use std::{
    ffi::{CStr, CString},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, trace};
use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE_EXTENDED};

use super::{blocking, Transport, TransportError};

/// Interval between card presence checks while waiting for a tap
const PRESENCE_POLL: Duration = Duration::from_millis(250);

/// Transport using a PC/SC reader (eg. a USB NFC reader)
pub struct PcscTransport {
    ctx: Context,
    reader: CString,
    card: Option<Arc<Mutex<Card>>>,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Create a transport for the named reader
    pub fn new(reader: &CStr) -> Result<Self, TransportError> {
        let ctx = Context::establish(Scope::User)?;

        Ok(Self {
            ctx,
            reader: reader.to_owned(),
            card: None,
        })
    }

    /// List available PC/SC readers
    pub fn list_readers() -> Result<Vec<CString>, TransportError> {
        let ctx = Context::establish(Scope::User)?;
        let readers = ctx.list_readers_owned()?;

        debug!("Found {} PC/SC readers", readers.len());

        Ok(readers)
    }

    /// Reader name
    pub fn reader(&self) -> &CStr {
        &self.reader
    }
}

#[async_trait]
impl Transport for PcscTransport {
    /// Poll until a card is presented to the reader
    async fn connect(&mut self) -> Result<(), TransportError> {
        loop {
            match self
                .ctx
                .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            {
                Ok(c) => {
                    debug!("Card connected ({:?})", self.reader);
                    self.card = Some(Arc::new(Mutex::new(c)));
                    return Ok(());
                }
                Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::RemovedCard) => {
                    trace!("Awaiting card");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(PRESENCE_POLL).await;
        }
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.clone().ok_or(TransportError::NoCard)?;
        let apdu = apdu.to_vec();

        let resp = blocking(move || {
            let card = card.lock().map_err(|_| TransportError::NoCard)?;

            let mut buff = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
            let resp = card.transmit(&apdu, &mut buff)?;

            Ok(resp.to_vec())
        })
        .await?;

        if resp.len() < 2 {
            return Err(TransportError::InvalidResponse);
        }

        Ok(resp)
    }

    fn disconnect(&mut self) {
        let c = match self.card.take().map(Arc::try_unwrap) {
            Some(Ok(c)) => c,
            // Still held by an abandoned transmit, released on drop
            Some(Err(_)) => {
                debug!("Card busy, deferring disconnect");
                return;
            }
            None => return,
        };

        let c = match c.into_inner() {
            Ok(c) => c,
            Err(p) => p.into_inner(),
        };

        if let Err((_c, e)) = c.disconnect(Disposition::LeaveCard) {
            debug!("Card disconnect failed: {:?}", e);
        }
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure channel owning the card transport
//!
//! Only one [Session] may be open at a time, further attempts fail with
//! [Error::Busy]. Sessions release the card when dropped.

use std::{sync::Arc, time::Duration};

use log::{debug, trace};
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard};

use nfc_wallet_apdu::{ApduCmd, StatusWord};

use crate::{
    config::SessionConfig,
    event::{SessionEvent, SessionState},
    transport::Transport,
    Error,
};

/// Event channel depth, slow subscribers miss older events
const EVENT_CAPACITY: usize = 32;

/// Secure channel for a [Transport], shared between clones
pub struct SecureChannel<T: Transport> {
    /// Transport for communication
    t: Arc<Mutex<T>>,
    /// Session timeouts
    config: SessionConfig,
    /// Session event broadcast
    events: broadcast::Sender<SessionEvent>,
    /// Cancellation epoch, bumped by [SecureChannel::close]
    cancel: Arc<watch::Sender<u64>>,
}

impl<T: Transport> Clone for SecureChannel<T> {
    fn clone(&self) -> Self {
        Self {
            t: self.t.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Create a [SecureChannel] wrapper from a type implementing [Transport]
impl<T: Transport> From<T> for SecureChannel<T> {
    fn from(t: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (cancel, _) = watch::channel(0);

        Self {
            t: Arc::new(Mutex::new(t)),
            config: SessionConfig::default(),
            events,
            cancel: Arc::new(cancel),
        }
    }
}

impl<T: Transport> SecureChannel<T> {
    /// Apply session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cancel any pending session, idempotent
    pub fn close(&self) {
        debug!("Closing secure channel");
        self.cancel.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Open a session, waiting for a card within the tap timeout
    pub async fn open(&self) -> Result<Session<T>, Error> {
        let t = self.t.clone().try_lock_owned().map_err(|_| Error::Busy)?;

        let mut s = Session {
            t,
            timeout: self.config.command_timeout(),
            cancel: self.cancel.subscribe(),
            events: self.events.clone(),
        };

        s.emit(SessionEvent::AwaitingTap);
        s.connect(self.config.tap_timeout()).await?;
        s.emit(SessionEvent::SessionOpened);

        Ok(s)
    }
}

/// Open secure element session, holding the transport until dropped
pub struct Session<T: Transport> {
    t: OwnedMutexGuard<T>,
    timeout: Duration,
    cancel: watch::Receiver<u64>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    async fn connect(&mut self, timeout: Duration) -> Result<(), Error> {
        let r = tokio::select! {
            r = tokio::time::timeout(timeout, self.t.connect()) => r,
            Ok(_) = self.cancel.changed() => return Err(Error::UserCancelled),
        };

        r??;

        Ok(())
    }

    /// Exchange a raw APDU, returning the response data on success
    pub async fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>, Error> {
        if self.cancel.has_changed().unwrap_or(false) {
            return Err(Error::UserCancelled);
        }

        let r = tokio::select! {
            r = tokio::time::timeout(self.timeout, self.t.exchange(apdu)) => r,
            Ok(_) = self.cancel.changed() => return Err(Error::UserCancelled),
        };
        let resp = r??;

        let (data, sw) = StatusWord::split(&resp)?;

        trace!("Response: {} bytes (status: {:04x})", data.len(), sw);

        if sw != StatusWord::OK {
            debug!("Command failed: {} ({:04x})", StatusWord::from(sw), sw);
            return Err(Error::Status(sw));
        }

        Ok(data.to_vec())
    }

    /// Encode and exchange an APDU command
    pub async fn request(&mut self, cmd: impl ApduCmd) -> Result<Vec<u8>, Error> {
        let apdu = cmd.to_vec()?;
        self.transceive(&apdu).await
    }

    /// Report a session state change
    pub fn state(&self, state: SessionState) {
        debug!("Session state: {}", state);
        self.emit(SessionEvent::State(state));
    }

    fn emit(&self, e: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(e);
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.t.disconnect();
        self.emit(SessionEvent::SessionClosed);
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::transport::TransportError;

    /// Transport returning a fixed response, recording disconnects
    struct FixedTransport {
        resp: Vec<u8>,
        delay: Duration,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn exchange(&mut self, _apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.resp.clone())
        }

        fn disconnect(&mut self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn channel(resp: &[u8], delay: Duration) -> (SecureChannel<FixedTransport>, Arc<AtomicUsize>) {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let c = SecureChannel::from(FixedTransport {
            resp: resp.to_vec(),
            delay,
            disconnects: disconnects.clone(),
        });
        (c, disconnects)
    }

    #[tokio::test]
    async fn status_words() {
        let (c, _) = channel(&[0xaa, 0x90, 0x00], Duration::ZERO);
        let mut s = c.open().await.unwrap();
        assert_eq!(s.transceive(&[0x00]).await.unwrap(), vec![0xaa]);
        drop(s);

        let (c, _) = channel(&[0x6a, 0x82], Duration::ZERO);
        let mut s = c.open().await.unwrap();
        assert!(matches!(s.transceive(&[0x00]).await, Err(Error::Status(0x6a82))));
    }

    #[tokio::test]
    async fn single_session() {
        let (c, disconnects) = channel(&[0x90, 0x00], Duration::ZERO);

        let s = c.open().await.unwrap();
        assert!(matches!(c.clone().open().await, Err(Error::Busy)));

        drop(s);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        let _s = c.open().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn command_timeout() {
        let (c, disconnects) = channel(&[0x90, 0x00], Duration::from_secs(10));

        let mut s = c.open().await.unwrap();
        assert!(matches!(s.transceive(&[0x00]).await, Err(Error::RequestTimeout)));

        drop(s);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    /// Transport blocking a pool thread for each exchange, as PC/SC readers do
    struct BlockingTransport;

    #[async_trait]
    impl Transport for BlockingTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn exchange(&mut self, _apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
            crate::transport::blocking(|| {
                std::thread::sleep(Duration::from_secs(2));
                Ok(vec![0x90, 0x00])
            })
            .await
        }

        fn disconnect(&mut self) {}
    }

    #[tokio::test]
    async fn blocking_exchange_bounded() {
        let c = SecureChannel::from(BlockingTransport).with_config(SessionConfig {
            command_timeout_s: 1,
            ..Default::default()
        });

        let start = std::time::Instant::now();
        let mut s = c.open().await.unwrap();
        assert!(matches!(s.transceive(&[0x00]).await, Err(Error::RequestTimeout)));
        assert!(start.elapsed() < Duration::from_millis(1900));
        drop(s);

        // Cancellation applies while the reader call is outstanding
        let mut s = c.open().await.unwrap();
        let c1 = c.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            c1.close();
        });

        let start = std::time::Instant::now();
        assert!(matches!(s.transceive(&[0x00]).await, Err(Error::UserCancelled)));
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels() {
        let (c, _) = channel(&[0x90, 0x00], Duration::from_secs(3));
        let mut events = c.subscribe();

        let mut s = c.open().await.unwrap();

        let c1 = c.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            c1.close();
            c1.close();
        });

        let r = s.transceive(&[0x00]).await;
        assert!(matches!(r, Err(Error::UserCancelled)));
        drop(s);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::AwaitingTap);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SessionOpened);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SessionClosed);

        // New sessions are unaffected by earlier cancellation
        let mut s = c.open().await.unwrap();
        assert!(s.transceive(&[0x00]).await.is_ok());
    }
}

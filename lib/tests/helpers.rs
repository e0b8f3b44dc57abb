use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use log::LevelFilter;
use simplelog::SimpleLogger;
use tokio::sync::Mutex;

use nfc_wallet::{
    transport::{Transport, TransportError},
    SecureElement,
};
use nfc_wallet_sim::{Faults, SimCard};

/// Setup logging, level from the `LOG_LEVEL` environment variable
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// In-process transport for a simulated card, counting exchanges
#[derive(Clone)]
pub struct SimTransport {
    pub card: Arc<Mutex<SimCard>>,
    exchanges: Arc<AtomicUsize>,
}

impl SimTransport {
    pub fn new(card: SimCard) -> Self {
        Self {
            card: Arc::new(Mutex::new(card)),
            exchanges: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of APDUs exchanged with the card
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.card.lock().await.reset();
        Ok(())
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(self.card.lock().await.process(apdu))
    }

    fn disconnect(&mut self) {}
}

/// Setup a secure element handle for a simulated card with the provided faults,
/// returning a transport clone for inspection
pub fn setup(faults: Faults) -> (SecureElement<SimTransport>, SimTransport) {
    setup_logging();

    let t = SimTransport::new(SimCard::new(faults));

    (SecureElement::from(t.clone()), t)
}

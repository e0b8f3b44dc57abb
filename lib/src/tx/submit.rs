// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction and bundle submission with bounded polling / retry

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::time::{sleep, Instant};

use super::{Signature, Transaction};
use crate::{config::SubmitConfig, Error};

/// Transaction submission and status RPC
#[async_trait]
pub trait Rpc: Send + Sync {
    /// Submit a signed transaction (without node-side retries)
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, Error>;

    /// Fetch the status of a submitted transaction, `None` if not yet seen
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, Error>;
}

/// Atomic bundle relay
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit base64 encoded transactions as a bundle, returning the bundle id
    async fn send_bundle(&self, transactions: &[String]) -> Result<String, Error>;

    /// Fetch the status of a submitted bundle
    async fn get_bundle_status(&self, bundle_id: &str) -> Result<BundleStatus, Error>;
}

/// Signature status as reported by the RPC node
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    pub err: Option<serde_json::Value>,
    pub confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    /// Check whether the transaction has reached confirmed or finalized commitment
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status,
            Some(Commitment::Confirmed | Commitment::Finalized)
        )
    }
}

/// Commitment levels
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Bundle status as reported by the relay
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, strum::Display)]
pub enum BundleStatus {
    Invalid,
    Pending,
    Landed,
    Failed,
}

/// Submission engine
#[derive(Clone)]
pub struct Submitter {
    rpc: Arc<dyn Rpc>,
    relay: Arc<dyn BundleRelay>,
    config: SubmitConfig,
}

impl Submitter {
    /// Create a new submitter with the provided RPC and bundle relay
    pub fn new(rpc: Arc<dyn Rpc>, relay: Arc<dyn BundleRelay>, config: SubmitConfig) -> Self {
        Self { rpc, relay, config }
    }

    /// Send a transaction and poll for confirmation within the confirmation window
    pub async fn send_and_confirm(&self, tx: &Transaction) -> Result<Signature, Error> {
        let signature = self.rpc.send_transaction(tx).await?;
        let start = Instant::now();

        debug!("Sent transaction {signature}, awaiting confirmation");

        loop {
            sleep(self.config.poll_interval()).await;

            match self.rpc.get_signature_status(&signature).await {
                Ok(Some(SignatureStatus { err: Some(e), .. })) => {
                    return Err(Error::TransactionFailed(e.to_string()));
                }
                Ok(Some(s)) if s.is_confirmed() => {
                    info!("Transaction {signature} confirmed (slot {})", s.slot);
                    return Ok(signature);
                }
                Ok(s) => debug!("Transaction {signature} pending: {:?}", s),
                Err(e) => warn!("Status request failed: {e}"),
            }

            if start.elapsed() >= self.config.confirm_timeout() {
                warn!("Timeout awaiting confirmation for {signature}");
                return Err(Error::ConfirmationTimeout);
            }
        }
    }

    /// Send a transaction, resending on transient failures until the
    /// retry budget is exhausted
    pub async fn poll_and_send_transaction(&self, tx: &Transaction) -> Result<Signature, Error> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.send_and_confirm(tx).await {
                Ok(s) => return Ok(s),
                Err(e) if !e.is_retryable() => {
                    error!("Transaction rejected: {e}");
                    return Err(e);
                }
                Err(e) if start.elapsed() >= self.config.retry_budget() => {
                    error!("Transaction not confirmed after {attempt} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {attempt} failed: {e}, resending");
                    sleep(self.config.retry_interval()).await;
                }
            }
        }
    }

    /// Submit transactions as an atomic bundle and poll until landed
    pub async fn send_bundle_and_poll(&self, txs: &[&Transaction]) -> Result<String, Error> {
        let encoded: Vec<_> = txs.iter().map(|t| t.to_base64()).collect();

        let bundle_id = self.relay.send_bundle(&encoded).await?;
        let start = Instant::now();

        debug!("Sent bundle {bundle_id} ({} transactions)", txs.len());

        loop {
            sleep(self.config.poll_interval()).await;

            match self.relay.get_bundle_status(&bundle_id).await {
                Ok(BundleStatus::Landed) => {
                    info!("Bundle {bundle_id} landed");
                    return Ok(bundle_id);
                }
                Ok(BundleStatus::Failed) => return Err(Error::BundleFailed(bundle_id)),
                Ok(s) => debug!("Bundle {bundle_id} status: {s}"),
                Err(e) => warn!("Bundle status request failed: {e}"),
            }

            if start.elapsed() >= self.config.bundle_timeout() {
                warn!("Timeout awaiting bundle {bundle_id}");
                return Err(Error::ConfirmationTimeout);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use super::*;
    use crate::tx::Pubkey;

    /// RPC returning scripted statuses, `None` once exhausted
    #[derive(Default)]
    struct MockRpc {
        sends: AtomicUsize,
        send_error: Option<&'static str>,
        statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
    }

    #[async_trait]
    impl Rpc for MockRpc {
        async fn send_transaction(&self, _tx: &Transaction) -> Result<Signature, Error> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.send_error {
                Some(e) => Err(Error::SendTransaction(e.to_string())),
                None => Ok(Signature([0x5a; 64])),
            }
        }

        async fn get_signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<SignatureStatus>, Error> {
            Ok(self.statuses.lock().unwrap().pop_front().flatten())
        }
    }

    #[derive(Default)]
    struct MockRelay {
        statuses: Mutex<VecDeque<BundleStatus>>,
        bundles: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BundleRelay for MockRelay {
        async fn send_bundle(&self, transactions: &[String]) -> Result<String, Error> {
            self.bundles.lock().unwrap().push(transactions.to_vec());
            Ok("bundle-1".to_string())
        }

        async fn get_bundle_status(&self, _bundle_id: &str) -> Result<BundleStatus, Error> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(BundleStatus::Pending))
        }
    }

    fn status(c: Commitment, err: Option<&str>) -> Option<SignatureStatus> {
        Some(SignatureStatus {
            slot: 100,
            confirmations: None,
            err: err.map(|e| serde_json::Value::String(e.to_string())),
            confirmation_status: Some(c),
        })
    }

    fn tx() -> Transaction {
        Transaction::new(vec![Pubkey([1; 32])], vec![0x01, 0x02])
    }

    fn submitter(rpc: Arc<MockRpc>, relay: Arc<MockRelay>) -> Submitter {
        Submitter::new(rpc, relay, SubmitConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed() {
        let rpc = Arc::new(MockRpc::default());
        rpc.statuses.lock().unwrap().extend([
            None,
            status(Commitment::Processed, None),
            status(Commitment::Confirmed, None),
        ]);

        let s = submitter(rpc.clone(), Arc::new(MockRelay::default()));

        let start = Instant::now();
        assert_eq!(s.send_and_confirm(&tx()).await.unwrap(), Signature([0x5a; 64]));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn on_chain_error() {
        let rpc = Arc::new(MockRpc::default());
        rpc.statuses
            .lock()
            .unwrap()
            .push_back(status(Commitment::Confirmed, Some("InstructionError")));

        let s = submitter(rpc.clone(), Arc::new(MockRelay::default()));

        let r = s.poll_and_send_transaction(&tx()).await;
        assert!(matches!(r, Err(Error::TransactionFailed(_))));
        assert_eq!(rpc.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_not_retried() {
        let rpc = Arc::new(MockRpc {
            send_error: Some("blockhash not found"),
            ..Default::default()
        });

        let s = submitter(rpc.clone(), Arc::new(MockRelay::default()));

        let r = s.poll_and_send_transaction(&tx()).await;
        assert!(matches!(r, Err(Error::SendTransaction(_))));
        assert_eq!(rpc.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bundle_landed() {
        let relay = Arc::new(MockRelay::default());
        relay.statuses.lock().unwrap().extend([
            BundleStatus::Invalid,
            BundleStatus::Pending,
            BundleStatus::Landed,
        ]);

        let s = submitter(Arc::new(MockRpc::default()), relay.clone());

        let (a, b) = (tx(), tx());
        assert_eq!(s.send_bundle_and_poll(&[&a, &b]).await.unwrap(), "bundle-1");

        let bundles = relay.bundles.lock().unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0], vec![a.to_base64(), b.to_base64()]);
    }

    #[tokio::test(start_paused = true)]
    async fn bundle_failed() {
        let relay = Arc::new(MockRelay::default());
        relay.statuses.lock().unwrap().push_back(BundleStatus::Failed);

        let s = submitter(Arc::new(MockRpc::default()), relay);

        let start = Instant::now();
        let r = s.send_bundle_and_poll(&[&tx()]).await;
        assert!(matches!(r, Err(Error::BundleFailed(id)) if id == "bundle-1"));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn bundle_timeout() {
        let s = submitter(Arc::new(MockRpc::default()), Arc::new(MockRelay::default()));

        let start = Instant::now();
        let r = s.send_bundle_and_poll(&[&tx()]).await;
        assert!(matches!(r, Err(Error::ConfirmationTimeout)));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }
}

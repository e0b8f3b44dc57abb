// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Multi-signer transaction orchestration
//!
//! Signers are grouped by [SignerKind] and each group is signed in a single
//! batched call, strictly in [SIGNING_ORDER] with the NFC secure element last.
//! Any group failure aborts the whole batch.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use log::{debug, error, info};

use nfc_wallet_apdu::chain::Chain;

use super::{
    PreparedTransaction, SignRequest, SignState, Signature, SignerKind, Submitter, Transaction,
    TransactionSigner,
};
use crate::{
    attestation::verify_signature, error::Violation, transport::Transport, Error, SecureElement,
};

/// Group signing order
pub const SIGNING_ORDER: [SignerKind; 3] = [SignerKind::Device, SignerKind::Cloud, SignerKind::Nfc];

/// Batch signing collaborator for a single signer class
#[async_trait]
pub trait BatchSigner: Send + Sync {
    /// Sign every request, returning signatures in request order
    async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<Signature>, Error>;
}

/// [BatchSigner] using an NFC secure element, every request is signed
/// within a single card session
pub struct NfcSigner<T: Transport> {
    se: SecureElement<T>,
    chain: Chain,
}

impl<T: Transport> NfcSigner<T> {
    pub fn new(se: SecureElement<T>, chain: Chain) -> Self {
        Self { se, chain }
    }
}

#[async_trait]
impl<T: Transport + 'static> BatchSigner for NfcSigner<T> {
    async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<Signature>, Error> {
        let messages: Vec<&[u8]> = requests.iter().map(|r| r.message.as_slice()).collect();

        let signatures = self.se.sign_raw_payloads(&self.chain, &messages).await?;

        // The card signs with whichever key it holds, check this matches the requested signer
        for (r, s) in requests.iter().zip(&signatures) {
            if !verify_signature(&r.signer.0, &r.message, &s.0, self.chain.curve) {
                error!("Card signature does not match signer {}", r.signer);
                return Err(Violation::SignerMismatch.into());
            }
        }

        Ok(signatures)
    }
}

/// Submission result
#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    /// Single transaction, identified by its first signature
    Signature(Signature),
    /// Bundle of transactions, identified by relay bundle id
    Bundle(String),
}

/// Progress callback, invoked with the transaction id and updated signer
pub type Progress<'a> = dyn FnMut(&str, &TransactionSigner) + Send + 'a;

/// Signing orchestrator
pub struct Orchestrator {
    signers: HashMap<SignerKind, Arc<dyn BatchSigner>>,
    submitter: Submitter,
}

impl Orchestrator {
    /// Create a new orchestrator with no signing collaborators
    pub fn new(submitter: Submitter) -> Self {
        Self {
            signers: HashMap::new(),
            submitter,
        }
    }

    /// Register the collaborator for a signer class
    pub fn with_signer(mut self, kind: SignerKind, signer: Arc<dyn BatchSigner>) -> Self {
        self.signers.insert(kind, signer);
        self
    }

    /// Sign every transaction in the batch, group by group
    pub async fn sign(
        &self,
        batch: &mut [PreparedTransaction],
        progress: &mut Progress<'_>,
    ) -> Result<(), Error> {
        // Preconditions are checked before any signing occurs
        if let Some(s) = batch
            .iter()
            .flat_map(|tx| tx.signers.iter())
            .find(|s| s.kind == SignerKind::Unknown)
        {
            return Err(Error::UnknownSigner(s.key.to_string()));
        }

        let mut groups = Vec::new();
        for kind in SIGNING_ORDER {
            let members: Vec<(usize, usize)> = batch
                .iter()
                .enumerate()
                .flat_map(|(i, tx)| {
                    tx.signers
                        .iter()
                        .enumerate()
                        .filter(move |(_, s)| s.kind == kind)
                        .map(move |(j, _)| (i, j))
                })
                .collect();

            if members.is_empty() {
                continue;
            }

            let signer = self.signers.get(&kind).ok_or(Error::NoSigner(kind))?;
            groups.push((kind, signer.clone(), members));
        }

        for (kind, signer, members) in groups {
            let requests: Vec<_> = members
                .iter()
                .map(|&(i, j)| SignRequest {
                    transaction_id: batch[i].id.clone(),
                    signer: batch[i].signers[j].key,
                    message: batch[i].transaction.message().to_vec(),
                })
                .collect();

            info!("Requesting {} {} signatures", requests.len(), kind);

            let r = match signer.sign(&requests).await {
                Ok(s) if s.len() != requests.len() => Err(Error::Collaborator(format!(
                    "{} signer returned {} of {} signatures",
                    kind,
                    s.len(),
                    requests.len()
                ))),
                r => r,
            };

            let signatures = match r {
                Ok(s) => s,
                Err(e) => {
                    error!("{kind} signing failed: {e}");
                    abort(batch, progress);
                    return Err(e);
                }
            };

            for (&(i, j), s) in members.iter().zip(signatures) {
                let tx = &mut batch[i];
                let key = tx.signers[j].key;

                if let Err(e) = tx.transaction.add_signature(&key, s) {
                    error!("Failed to apply {kind} signature for {key}: {e}");
                    abort(batch, progress);
                    return Err(e);
                }
                tx.signers[j].state = SignState::Signed;

                debug!("Applied {kind} signature for {key} to {}", tx.id);
                progress(&tx.id, &tx.signers[j]);
            }
        }

        Ok(())
    }

    /// Sign the batch and submit, a single transaction directly and
    /// multiple transactions as an atomic bundle
    pub async fn sign_and_submit(
        &self,
        batch: &mut [PreparedTransaction],
        progress: &mut Progress<'_>,
    ) -> Result<Submission, Error> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }

        self.sign(batch, progress).await?;

        if let Some(tx) = batch.iter().find(|tx| !tx.transaction.is_signed()) {
            return Err(Error::MissingSignature(tx.id.clone()));
        }

        match &*batch {
            [tx] => self
                .submitter
                .poll_and_send_transaction(&tx.transaction)
                .await
                .map(Submission::Signature),
            _ => {
                let txs: Vec<&Transaction> = batch.iter().map(|tx| &tx.transaction).collect();
                self.submitter
                    .send_bundle_and_poll(&txs)
                    .await
                    .map(Submission::Bundle)
            }
        }
    }
}

/// Mark every signer in the batch failed
fn abort(batch: &mut [PreparedTransaction], progress: &mut Progress<'_>) {
    for tx in batch.iter_mut() {
        for s in tx.signers.iter_mut() {
            s.state = SignState::Error;
            progress(&tx.id, s);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        config::SubmitConfig,
        tx::{BundleRelay, BundleStatus, Pubkey, Rpc, SignatureStatus},
    };

    /// Signer recording call order into a shared log
    struct LogSigner {
        kind: SignerKind,
        log: Arc<Mutex<Vec<(SignerKind, usize)>>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchSigner for LogSigner {
        async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<Signature>, Error> {
            self.log.lock().unwrap().push((self.kind, requests.len()));

            match self.fail {
                true => Err(Error::Collaborator("declined".to_string())),
                false => Ok(requests.iter().map(|r| Signature([r.signer.0[0]; 64])).collect()),
            }
        }
    }

    struct NoRpc;

    #[async_trait]
    impl Rpc for NoRpc {
        async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, Error> {
            Ok(tx.first_signature().unwrap_or(Signature([0; 64])))
        }

        async fn get_signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<SignatureStatus>, Error> {
            Ok(Some(SignatureStatus {
                slot: 1,
                confirmations: None,
                err: None,
                confirmation_status: Some(crate::tx::Commitment::Finalized),
            }))
        }
    }

    #[async_trait]
    impl BundleRelay for NoRpc {
        async fn send_bundle(&self, transactions: &[String]) -> Result<String, Error> {
            Ok(format!("bundle-{}", transactions.len()))
        }

        async fn get_bundle_status(&self, _bundle_id: &str) -> Result<BundleStatus, Error> {
            Ok(BundleStatus::Landed)
        }
    }

    fn orchestrator(fail: Option<SignerKind>) -> (Orchestrator, Arc<Mutex<Vec<(SignerKind, usize)>>>) {
        let log = Arc::new(Mutex::new(vec![]));
        let submitter = Submitter::new(Arc::new(NoRpc), Arc::new(NoRpc), SubmitConfig::default());

        let mut o = Orchestrator::new(submitter);
        for kind in SIGNING_ORDER {
            o = o.with_signer(
                kind,
                Arc::new(LogSigner {
                    kind,
                    log: log.clone(),
                    fail: fail == Some(kind),
                }),
            );
        }

        (o, log)
    }

    fn prepared(id: &str, signers: &[(u8, SignerKind)]) -> PreparedTransaction {
        let signers: Vec<_> = signers
            .iter()
            .map(|(k, kind)| TransactionSigner::new(Pubkey([*k; 32]), *kind))
            .collect();

        PreparedTransaction::new(id, signers[0].key, signers, vec![0x01, 0x02, 0x03]).unwrap()
    }

    #[tokio::test]
    async fn groups_signed_in_order() {
        let (o, log) = orchestrator(None);

        let mut batch = vec![
            prepared("a", &[(1, SignerKind::Nfc), (2, SignerKind::Device)]),
            prepared("b", &[(3, SignerKind::Cloud), (4, SignerKind::Nfc)]),
        ];

        let mut updates = vec![];
        let mut progress = |id: &str, s: &TransactionSigner| updates.push((id.to_string(), s.clone()));

        o.sign(&mut batch, &mut progress).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (SignerKind::Device, 1),
                (SignerKind::Cloud, 1),
                (SignerKind::Nfc, 2)
            ]
        );

        assert_eq!(updates.len(), 4);
        assert!(updates.iter().all(|(_, s)| s.state == SignState::Signed));

        for tx in &batch {
            for (s, sig) in tx.signers.iter().zip(tx.transaction.signatures()) {
                assert_eq!(*sig, Some(Signature([s.key.0[0]; 64])));
            }
        }
    }

    #[tokio::test]
    async fn failure_aborts_batch() {
        let (o, log) = orchestrator(Some(SignerKind::Device));

        let mut batch = vec![prepared(
            "a",
            &[(1, SignerKind::Device), (2, SignerKind::Nfc)],
        )];

        let mut progress = |_: &str, _: &TransactionSigner| ();
        let r = o.sign(&mut batch, &mut progress).await;

        assert!(matches!(r, Err(Error::Collaborator(_))));
        assert_eq!(*log.lock().unwrap(), vec![(SignerKind::Device, 1)]);
        assert!(batch[0].signers.iter().all(|s| s.state == SignState::Error));
        assert!(!batch[0].transaction.is_signed());
    }

    #[tokio::test]
    async fn apply_failure_aborts_batch() {
        let (o, _log) = orchestrator(None);

        // Signer entry without a matching signature slot
        let mut batch = vec![PreparedTransaction {
            id: "a".to_string(),
            fee_payer: Pubkey([1; 32]),
            signers: vec![
                TransactionSigner::new(Pubkey([1; 32]), SignerKind::Device),
                TransactionSigner::new(Pubkey([2; 32]), SignerKind::Device),
            ],
            transaction: Transaction::new(vec![Pubkey([1; 32])], vec![0x01]),
        }];

        let mut updates = vec![];
        let mut progress = |_: &str, s: &TransactionSigner| updates.push(s.state);
        let r = o.sign(&mut batch, &mut progress).await;

        assert!(matches!(r, Err(Error::Collaborator(_))));
        assert!(batch[0].signers.iter().all(|s| s.state == SignState::Error));
        assert_eq!(
            updates,
            vec![SignState::Signed, SignState::Error, SignState::Error]
        );
    }

    #[tokio::test]
    async fn unknown_signer_rejected() {
        let (o, log) = orchestrator(None);

        let mut batch = vec![prepared(
            "a",
            &[(1, SignerKind::Device), (2, SignerKind::Unknown)],
        )];

        let mut progress = |_: &str, _: &TransactionSigner| ();
        let r = o.sign(&mut batch, &mut progress).await;

        assert!(matches!(r, Err(Error::UnknownSigner(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_collaborator() {
        let submitter = Submitter::new(Arc::new(NoRpc), Arc::new(NoRpc), SubmitConfig::default());
        let o = Orchestrator::new(submitter);

        let mut batch = vec![prepared("a", &[(1, SignerKind::Cloud)])];

        let mut progress = |_: &str, _: &TransactionSigner| ();
        let r = o.sign(&mut batch, &mut progress).await;
        assert!(matches!(r, Err(Error::NoSigner(SignerKind::Cloud))));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_single_and_bundle() {
        let (o, _log) = orchestrator(None);
        let mut progress = |_: &str, _: &TransactionSigner| ();

        let mut batch = vec![prepared("a", &[(7, SignerKind::Device)])];
        let r = o.sign_and_submit(&mut batch, &mut progress).await.unwrap();
        assert_eq!(r, Submission::Signature(Signature([7; 64])));

        let mut batch = vec![
            prepared("a", &[(1, SignerKind::Device)]),
            prepared("b", &[(2, SignerKind::Cloud)]),
        ];
        let r = o.sign_and_submit(&mut batch, &mut progress).await.unwrap();
        assert_eq!(r, Submission::Bundle("bundle-2".to_string()));

        let r = o.sign_and_submit(&mut [], &mut progress).await;
        assert!(matches!(r, Err(Error::EmptyBatch)));
    }

    #[tokio::test]
    async fn unsigned_not_submitted() {
        let (o, _log) = orchestrator(None);
        let mut progress = |_: &str, _: &TransactionSigner| ();

        // No signer entries for the required fee payer slot
        let mut batch = vec![PreparedTransaction {
            id: "a".to_string(),
            fee_payer: Pubkey([1; 32]),
            signers: vec![],
            transaction: Transaction::new(vec![Pubkey([1; 32])], vec![0x01]),
        }];
        let r = o.sign_and_submit(&mut batch, &mut progress).await;
        assert!(matches!(r, Err(Error::MissingSignature(id)) if id == "a"));
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for NFC secure elements
//!
//! This provides methods for reading (or provisioning) wallet addresses and
//! signing with on-card keys, and is generic over [Transport]s.

use encdec::Decode;
use log::{debug, info, warn};
use rand_core::{OsRng, RngCore};
use tokio::sync::broadcast;

use nfc_wallet_apdu::prelude::*;

use crate::{
    attestation::{
        validate_address, validate_asset, verify_attestation_key, verify_payload,
        verify_signature, AttestationKey,
    },
    channel::{SecureChannel, Session},
    config::SessionConfig,
    error::Violation,
    event::{SessionEvent, SessionState},
    transport::Transport,
    tx::{Pubkey, Signature},
    Error,
};

/// Length of the random self-test message
const SELF_TEST_LEN: usize = 16;

/// Wallet data read from a secure element
#[derive(Clone, Debug, PartialEq)]
pub struct SecureElementData {
    /// Address (public key) for the chain
    pub address: Pubkey,
    /// Stored asset identifier
    pub asset: Pubkey,
    /// Chain the address belongs to
    pub chain: Chain,
}

/// Attested object value and attributes, after signature verification
#[derive(Clone, Debug, PartialEq)]
pub struct AttestedObject {
    pub value: Vec<u8>,
    pub attributes: Vec<u8>,
}

impl AttestedObject {
    /// Parse object attributes
    pub fn attributes(&self) -> Result<SecureObjectAttributes<'_>, Error> {
        Ok(SecureObjectAttributes::parse(&self.attributes)?)
    }
}

/// Handle for an NFC secure element.
///
/// This is generic over [Transport] types to support different
/// readers / providers
pub struct SecureElement<T: Transport> {
    channel: SecureChannel<T>,
}

impl<T: Transport> Clone for SecureElement<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

/// Create a [SecureElement] wrapper from a type implementing [Transport]
impl<T: Transport> From<T> for SecureElement<T> {
    fn from(t: T) -> Self {
        Self {
            channel: SecureChannel::from(t),
        }
    }
}

impl<T: Transport> From<SecureChannel<T>> for SecureElement<T> {
    fn from(channel: SecureChannel<T>) -> Self {
        Self { channel }
    }
}

impl<T: Transport> SecureElement<T> {
    /// Apply session configuration
    pub fn with_config(self, config: SessionConfig) -> Self {
        Self {
            channel: self.channel.with_config(config),
        }
    }

    /// Fetch the underlying secure channel
    pub fn channel(&self) -> &SecureChannel<T> {
        &self.channel
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.channel.subscribe()
    }

    /// Cancel any active session, idempotent
    pub fn close(&self) {
        self.channel.close()
    }

    /// Read the address and asset for the provided chain,
    /// provisioning these on first use
    pub async fn read_secure_element(&self, chain: &Chain) -> Result<SecureElementData, Error> {
        info!("Reading secure element for {}", chain);

        let mut s = self.channel.open().await?;

        let r = read_session(&mut s, chain).await;
        finish(&s, &r);

        r
    }

    /// Sign a message with the chain key
    pub async fn sign_with_nfc_keypair(
        &self,
        chain: &Chain,
        message: &[u8],
    ) -> Result<Signature, Error> {
        check_size(message)?;

        let mut s = self.channel.open().await?;

        let r = async {
            select(&mut s).await?;
            sign_message(&mut s, chain, message).await
        }
        .await;
        finish(&s, &r);

        r
    }

    /// Sign a batch of messages with the chain key in a single session
    pub async fn sign_raw_payloads<M: AsRef<[u8]> + Sync>(
        &self,
        chain: &Chain,
        messages: &[M],
    ) -> Result<Vec<Signature>, Error> {
        // Check every message before touching the card
        for m in messages {
            check_size(m.as_ref())?;
        }

        if messages.is_empty() {
            return Ok(vec![]);
        }

        let mut s = self.channel.open().await?;

        let r = async {
            select(&mut s).await?;

            let mut signatures = Vec::with_capacity(messages.len());
            for (i, m) in messages.iter().enumerate() {
                debug!("Signing payload {} of {}", i + 1, messages.len());
                signatures.push(sign_message(&mut s, chain, m.as_ref()).await?);
            }

            Ok::<_, Error>(signatures)
        }
        .await;
        finish(&s, &r);

        r
    }
}

/// Report a terminal session state for an operation result
fn finish<T: Transport, V>(s: &Session<T>, r: &Result<V, Error>) {
    match r {
        Ok(_) => s.state(SessionState::Complete),
        Err(e) if e.is_cancelled() => s.state(SessionState::Cancelled),
        Err(e) => {
            warn!("Secure element operation failed: {}", e);
            s.state(SessionState::Failed);
        }
    }
}

fn check_size(message: &[u8]) -> Result<(), Error> {
    match message.len() > MAX_SIGN_PAYLOAD {
        true => Err(Error::SizeLimitExceeded(message.len())),
        false => Ok(()),
    }
}

/// Read (or provision) address and asset within an open session
async fn read_session<T: Transport>(
    s: &mut Session<T>,
    chain: &Chain,
) -> Result<SecureElementData, Error> {
    select(s).await?;

    let key = read_attestation_key(s).await?;
    s.state(SessionState::AttestationKeyVerified);

    // Address key object, generated on the card if absent
    let o = read_or_provision(s, &key, chain.id, CreateAddress::new(chain)).await?;
    validate_address(&o.attributes()?)?;

    // Key objects hold the public key (big-endian) at the end of the value
    let raw = o
        .value
        .len()
        .checked_sub(32)
        .and_then(|i| <[u8; 32]>::try_from(&o.value[i..]).ok())
        .ok_or(ApduError::InvalidLength)?;
    let address = to_little_endian_array(&raw);

    self_test(s, chain, &address).await?;
    s.state(SessionState::AddressResolved);

    // Asset object, defaulting to the native asset
    let o = read_or_provision(
        s,
        &key,
        ASSET_OBJECT_ID,
        CreateAsset::new(chain, chain.native_asset),
    )
    .await?;
    let asset = validate_asset(&o.attributes()?, &o.value, chain)?;
    s.state(SessionState::AssetResolved);

    let data = SecureElementData {
        address: Pubkey(address),
        asset: Pubkey(asset),
        chain: *chain,
    };

    info!("Resolved address {} (asset: {})", data.address, data.asset);

    Ok(data)
}

/// Select the wallet applet
pub async fn select<T: Transport>(s: &mut Session<T>) -> Result<(), Error> {
    debug!("Selecting wallet applet");

    match s.request(SelectApplet::default()).await {
        Ok(_) => (),
        Err(Error::Status(sw)) => {
            warn!("Applet selection failed: {}", StatusWord::from(sw));
            return Err(Error::AppletSelection);
        }
        Err(e) => return Err(e),
    }

    s.state(SessionState::AppletSelected);

    Ok(())
}

/// Read and self-verify the card attestation key
pub async fn read_attestation_key<T: Transport>(
    s: &mut Session<T>,
) -> Result<AttestationKey, Error> {
    debug!("Reading attestation key");

    let req = ReadWithAttestation::new(ATTESTATION_KEY_ID, ATTESTATION_KEY_ID, &mut OsRng);
    let challenge = req.challenge;

    let resp = s.request(req).await?;
    let payload = SecureObjectPayload::parse(&resp)?;

    check_challenge(&payload, &challenge)?;

    match verify_attestation_key(&payload) {
        Ok(k) => Ok(k),
        Err(Error::Apdu(_)) => Err(Violation::AttestationKey.into()),
        Err(e) => Err(e),
    }
}

/// Read an object with attestation, verifying the attestation signature
pub async fn read_attested<T: Transport>(
    s: &mut Session<T>,
    key: &AttestationKey,
    object_id: ObjectId,
) -> Result<AttestedObject, Error> {
    debug!("Reading object {:02x?}", object_id);

    let req = ReadWithAttestation::new(object_id, ATTESTATION_KEY_ID, &mut OsRng);
    let challenge = req.challenge;

    let resp = s.request(req).await?;
    let payload = SecureObjectPayload::parse(&resp)?;

    check_challenge(&payload, &challenge)?;

    let value = verify_payload(&payload, key)?;
    let attributes = payload.require(Tag::Tag2)?;

    Ok(AttestedObject {
        value: value.to_vec(),
        attributes: attributes.to_vec(),
    })
}

/// Read an object, creating it and re-reading (once) if the read or
/// verification fails
pub async fn read_or_provision<T: Transport>(
    s: &mut Session<T>,
    key: &AttestationKey,
    object_id: ObjectId,
    create: impl ApduCmd + Send,
) -> Result<AttestedObject, Error> {
    match read_attested(s, key, object_id).await {
        Ok(o) => return Ok(o),
        Err(e @ (Error::Status(_) | Error::Trust(_))) => {
            info!("Object {:02x?} unavailable ({}), provisioning", object_id, e);
        }
        Err(e) => return Err(e),
    }

    s.request(create).await?;

    read_attested(s, key, object_id).await
}

/// Check the freshness field echoes the request challenge
fn check_challenge(payload: &SecureObjectPayload, challenge: &[u8]) -> Result<(), Violation> {
    match payload.tag4 == Some(challenge) {
        true => Ok(()),
        false => Err(Violation::Challenge),
    }
}

/// Sign a message with the chain key, returning the little-endian signature
pub async fn sign_message<T: Transport>(
    s: &mut Session<T>,
    chain: &Chain,
    message: &[u8],
) -> Result<Signature, Error> {
    let resp = s.request(SignEd25519::new(chain, message)?).await?;
    let (r, _n) = SignatureResp::decode(&resp)?;

    Ok(Signature(r.signature))
}

/// Sign random bytes with the address key and verify the result
async fn self_test<T: Transport>(
    s: &mut Session<T>,
    chain: &Chain,
    address: &[u8; 32],
) -> Result<(), Error> {
    let mut m = [0u8; SELF_TEST_LEN];
    OsRng.fill_bytes(&mut m);

    let sig = sign_message(s, chain, &m).await?;

    match verify_signature(address, &m, &sig.0, chain.curve) {
        true => Ok(()),
        false => {
            warn!("Address key self-test failed");
            Err(Violation::KeySignature.into())
        }
    }
}

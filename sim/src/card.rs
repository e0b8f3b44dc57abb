// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software secure element
//!
//! Implements the card side of the wallet applet protocol: applet selection,
//! attested reads signed by a P-256 attestation key, object provisioning and
//! Ed25519 signing with big-endian component encoding.

use std::collections::HashMap;

use ed25519_dalek::{Signer, SigningKey};
use encdec::{Decode, Encode};
use log::{debug, trace, warn};
use p256::{
    ecdsa::{Signature as AttestationSignature, SigningKey as AttestationKey, VerifyingKey},
    pkcs8::EncodePublicKey,
};
use rand_core::{OsRng, RngCore};

use nfc_wallet_apdu::{
    create::tags as create_tags,
    prelude::*,
    read::{tags as read_tags, ATTESTATION_ALGO},
    sign::{tags as sign_tags, ALGO_EDDSA},
    ISO_CLA, SE_APDU_CLA,
};

/// DER SubjectPublicKeyInfo prefix for Ed25519 keys, key object values are
/// returned in this form with the key bytes big-endian
pub const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Length of the chip unique identifier
pub const CHIP_ID_LEN: usize = 18;

/// Fault injection options, used to exercise host-side verification
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Faults {
    /// Override the origin reported for generated address keys
    pub address_origin: Option<u8>,

    /// Override the policy reported for generated address keys
    pub address_policy: Option<Vec<u8>>,

    /// Override the authentication indicator for generated address keys
    pub address_auth_indicator: Option<u8>,

    /// Override the object class reported for generated address keys
    pub address_class: Option<u8>,

    /// Corrupt attested values after signing
    pub tamper_attestation: bool,

    /// Sign attested reads with a key other than the published attestation key
    pub foreign_attestation: bool,

    /// Sign messages with a key other than the stored address key
    pub wrong_sign_key: bool,

    /// Reject applet selection
    pub reject_select: bool,

    /// Reject object creation
    pub reject_create: bool,
}

/// Object attributes held by the card
#[derive(Clone, Debug, PartialEq)]
struct Attributes {
    class: u8,
    auth_indicator: u8,
    policy: Vec<u8>,
    origin: u8,
}

/// Objects stored on the card
enum SecureObject {
    Key {
        key: SigningKey,
        attributes: Attributes,
    },
    Binary {
        data: Vec<u8>,
        attributes: Attributes,
    },
}

impl SecureObject {
    fn attributes(&self) -> &Attributes {
        match self {
            SecureObject::Key { attributes, .. } => attributes,
            SecureObject::Binary { attributes, .. } => attributes,
        }
    }

    /// Object value as returned by an attested read
    fn value(&self) -> Vec<u8> {
        match self {
            SecureObject::Key { key, .. } => {
                let mut v = ED25519_SPKI_PREFIX.to_vec();
                v.extend_from_slice(&to_little_endian(key.verifying_key().as_bytes()));
                v
            }
            SecureObject::Binary { data, .. } => data.clone(),
        }
    }
}

/// Software secure element
pub struct SimCard {
    faults: Faults,
    attestation: AttestationKey,
    chip_id: [u8; CHIP_ID_LEN],
    objects: HashMap<ObjectId, SecureObject>,
    selected: bool,
    counter: u32,
    history: Vec<Vec<u8>>,
}

impl Default for SimCard {
    fn default() -> Self {
        Self::new(Faults::default())
    }
}

impl SimCard {
    /// Create a new (unprovisioned) card with the provided faults
    pub fn new(faults: Faults) -> Self {
        let mut chip_id = [0u8; CHIP_ID_LEN];
        OsRng.fill_bytes(&mut chip_id);

        Self {
            faults,
            attestation: AttestationKey::random(&mut OsRng),
            chip_id,
            objects: HashMap::new(),
            selected: false,
            counter: 0,
            history: vec![],
        }
    }

    /// Mutable access to fault options
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Attestation public key
    pub fn attestation_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.attestation)
    }

    /// Reset session state, called on each new connection / tap
    pub fn reset(&mut self) {
        debug!("Card reset");
        self.selected = false;
    }

    /// Raw commands received by the card
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.history
    }

    /// Count received commands with the provided instruction
    pub fn count(&self, ins: Instruction) -> usize {
        self.history
            .iter()
            .filter(|c| c.get(1) == Some(&(ins as u8)))
            .count()
    }

    /// Count key creation requests
    pub fn key_creations(&self) -> usize {
        self.history
            .iter()
            .filter_map(|c| CommandFrame::decode(c).ok().map(|(f, _)| f))
            .filter(|f| f.ins == Instruction::Write as u8)
            .filter(|f| matches!(TlvIter::find_tag(f.body, create_tags::CURVE), Ok(Some(_))))
            .count()
    }

    /// Little-endian public key for the chain's address object, if present
    pub fn address(&self, chain: &Chain) -> Option<[u8; 32]> {
        match self.objects.get(&chain.id) {
            Some(SecureObject::Key { key, .. }) => Some(key.verifying_key().to_bytes()),
            _ => None,
        }
    }

    /// Stored asset value (chain tag and asset identifier), if present
    pub fn asset(&self) -> Option<&[u8]> {
        match self.objects.get(&ASSET_OBJECT_ID) {
            Some(SecureObject::Binary { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// Write an asset object directly, bypassing the command interface
    pub fn insert_asset(&mut self, value: &[u8], policy: &[u8]) {
        self.objects.insert(
            ASSET_OBJECT_ID,
            SecureObject::Binary {
                data: value.to_vec(),
                attributes: Attributes {
                    class: OBJECT_CLASS_BINARY,
                    auth_indicator: AUTH_INDICATOR_NOT_SET,
                    policy: policy.to_vec(),
                    origin: Origin::External as u8,
                },
            },
        );
    }

    /// Process a raw command APDU, returning the response with status word
    pub fn process(&mut self, apdu: &[u8]) -> Vec<u8> {
        trace!("RX: {}", hex::encode(apdu));

        self.history.push(apdu.to_vec());

        let r = match CommandFrame::decode(apdu) {
            Ok((f, _)) => self.handle(&f),
            Err(e) => {
                warn!("Invalid command frame: {:?}", e);
                Err(StatusWord::WrongData)
            }
        };

        let resp = match r {
            Ok(mut data) => {
                data.extend_from_slice(&StatusWord::Ok.to_bytes());
                data
            }
            Err(sw) => {
                debug!("Command failed: {}", sw);
                sw.to_bytes().to_vec()
            }
        };

        trace!("TX: {}", hex::encode(&resp));

        resp
    }

    fn handle(&mut self, f: &CommandFrame) -> Result<Vec<u8>, StatusWord> {
        let ins = Instruction::try_from(f.ins).map_err(|_| StatusWord::InsNotSupported)?;

        match (f.cla, ins) {
            (ISO_CLA, Instruction::Select) => self.select(f.body),
            (SE_APDU_CLA, _) if !self.selected => Err(StatusWord::ConditionsNotSatisfied),
            (SE_APDU_CLA, Instruction::ReadAttested) => self.read(f.body),
            (SE_APDU_CLA, Instruction::Write) => self.create(f.body),
            (SE_APDU_CLA, Instruction::Crypto) => self.sign(f.body),
            _ => Err(StatusWord::ClaNotSupported),
        }
    }

    fn select(&mut self, aid: &[u8]) -> Result<Vec<u8>, StatusWord> {
        if self.faults.reject_select || aid != WALLET_AID {
            return Err(StatusWord::NotFound);
        }

        debug!("Applet selected");
        self.selected = true;

        Ok(vec![])
    }

    fn read(&mut self, body: &[u8]) -> Result<Vec<u8>, StatusWord> {
        let object_id = parse_id(field(body, read_tags::OBJECT_ID)?)?;
        let attestation_id = parse_id(field(body, read_tags::ATTESTATION_KEY_ID)?)?;
        let challenge = field(body, read_tags::CHALLENGE)?;

        if attestation_id != ATTESTATION_KEY_ID
            || field(body, read_tags::ATTESTATION_ALGO)? != [ATTESTATION_ALGO]
        {
            return Err(StatusWord::WrongData);
        }

        debug!("Attested read: {}", hex::encode(object_id));

        // Resolve object value and attributes
        let (value, attributes) = match object_id {
            ATTESTATION_KEY_ID => {
                let v = self
                    .attestation
                    .verifying_key()
                    .to_public_key_der()
                    .map_err(|_| StatusWord::Other(0x6F00))?;

                let a = Attributes {
                    class: OBJECT_CLASS_KEY,
                    auth_indicator: AUTH_INDICATOR_NOT_SET,
                    policy: vec![],
                    origin: Origin::Provisioned as u8,
                };

                (v.as_bytes().to_vec(), a)
            }
            _ => match self.objects.get(&object_id) {
                Some(o) => (o.value(), o.attributes().clone()),
                None => return Err(StatusWord::NotFound),
            },
        };

        let mut attr_buff = [0u8; 64];
        let attr_len = SecureObjectAttributes {
            object_id,
            object_class: attributes.class,
            authentication_indicator: attributes.auth_indicator,
            auth_counter: 0,
            auth_id: [0u8; 4],
            max_auth_attempts: 0,
            policy: &attributes.policy,
            origin: attributes.origin,
        }
        .encode(&mut attr_buff)
        .map_err(|_| StatusWord::WrongData)?;

        self.counter = self.counter.wrapping_add(1);
        let timestamp = self.counter.to_be_bytes();

        let mut payload = SecureObjectPayload {
            tag1: Some(&value),
            tag2: Some(&attr_buff[..attr_len]),
            tag3: Some(&timestamp),
            tag4: Some(challenge),
            tag5: Some(&self.chip_id),
            tag6: None,
        };

        // Sign TAG_1..TAG_5
        let message = payload.signed_message_vec();
        let signature: AttestationSignature = match self.faults.foreign_attestation {
            true => AttestationKey::random(&mut OsRng).sign(&message),
            false => self.attestation.sign(&message),
        };
        let signature = signature.to_der();

        // Corrupt the value after signing
        let mut tampered = value.clone();
        if self.faults.tamper_attestation {
            if let Some(b) = tampered.last_mut() {
                *b ^= 0x01;
            }
            payload.tag1 = Some(&tampered);
        }

        payload.tag6 = Some(signature.as_bytes());

        let mut resp = vec![0u8; payload.encoded_len()];
        let n = payload
            .encode(&mut resp)
            .map_err(|_| StatusWord::WrongData)?;
        resp.truncate(n);

        Ok(resp)
    }

    fn create(&mut self, body: &[u8]) -> Result<Vec<u8>, StatusWord> {
        if self.faults.reject_create {
            return Err(StatusWord::SecurityNotSatisfied);
        }

        let policy = field(body, create_tags::POLICY)?.to_vec();
        let object_id = parse_id(field(body, create_tags::OBJECT_ID)?)?;

        let curve = TlvIter::find_tag(body, create_tags::CURVE).map_err(|_| StatusWord::WrongData)?;
        let data = TlvIter::find_tag(body, create_tags::DATA).map_err(|_| StatusWord::WrongData)?;

        let object = match (curve, data) {
            (Some(c), None) => {
                if c != [Curve::Ed25519 as u8] {
                    return Err(StatusWord::WrongData);
                }

                if self.objects.contains_key(&object_id) {
                    return Err(StatusWord::ConditionsNotSatisfied);
                }

                debug!("Generating key: {}", hex::encode(object_id));

                SecureObject::Key {
                    key: SigningKey::generate(&mut OsRng),
                    attributes: Attributes {
                        class: self.faults.address_class.unwrap_or(OBJECT_CLASS_KEY),
                        auth_indicator: self
                            .faults
                            .address_auth_indicator
                            .unwrap_or(AUTH_INDICATOR_NOT_SET),
                        policy: self.faults.address_policy.clone().unwrap_or(policy),
                        origin: self.faults.address_origin.unwrap_or(ORIGIN_GENERATED),
                    },
                }
            }
            (None, Some(d)) => {
                let size = field(body, create_tags::SIZE)?;
                if size.len() != 2 || u16::from_be_bytes([size[0], size[1]]) as usize != d.len() {
                    return Err(StatusWord::WrongData);
                }

                debug!("Writing binary: {} ({} bytes)", hex::encode(object_id), d.len());

                SecureObject::Binary {
                    data: d.to_vec(),
                    attributes: Attributes {
                        class: OBJECT_CLASS_BINARY,
                        auth_indicator: AUTH_INDICATOR_NOT_SET,
                        policy,
                        origin: Origin::External as u8,
                    },
                }
            }
            _ => return Err(StatusWord::WrongData),
        };

        self.objects.insert(object_id, object);

        Ok(vec![])
    }

    fn sign(&mut self, body: &[u8]) -> Result<Vec<u8>, StatusWord> {
        let key_id = parse_id(field(body, sign_tags::KEY_ID)?)?;
        let message = field(body, sign_tags::MESSAGE)?;

        if field(body, sign_tags::ALGO)? != [ALGO_EDDSA] {
            return Err(StatusWord::WrongData);
        }

        if message.len() > MAX_SIGN_PAYLOAD {
            return Err(StatusWord::WrongData);
        }

        let key = match self.objects.get(&key_id) {
            Some(SecureObject::Key { key, .. }) => key,
            Some(_) => return Err(StatusWord::ConditionsNotSatisfied),
            None => return Err(StatusWord::NotFound),
        };

        debug!("Signing {} bytes with key: {}", message.len(), hex::encode(key_id));

        let signature = match self.faults.wrong_sign_key {
            true => SigningKey::generate(&mut OsRng).sign(message),
            false => key.sign(message),
        };

        let r = SignatureResp::new(signature.to_bytes());

        let mut resp = vec![0u8; r.encode_len().map_err(|_| StatusWord::WrongData)?];
        r.encode(&mut resp).map_err(|_| StatusWord::WrongData)?;

        Ok(resp)
    }
}

/// Fetch a required TLV field from a command body
fn field(body: &[u8], tag: u8) -> Result<&[u8], StatusWord> {
    match TlvIter::find_tag(body, tag) {
        Ok(Some(v)) => Ok(v),
        _ => Err(StatusWord::WrongData),
    }
}

/// Parse a four byte object identifier
fn parse_id(v: &[u8]) -> Result<ObjectId, StatusWord> {
    v.try_into().map_err(|_| StatusWord::WrongData)
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Attested object read APDU

use encdec::Encode;
use rand_core::{CryptoRng, RngCore};

use crate::{
    chain::ObjectId,
    tlv::{tlv_len, TlvWriter},
    ApduError, ApduStatic, Instruction, SE_APDU_CLA,
};

/// Attestation algorithm selector (ECDSA / SHA-256)
pub const ATTESTATION_ALGO: u8 = 0x21;

/// Length of the freshness challenge
pub const CHALLENGE_LEN: usize = 16;

/// TLV tags used in [ReadWithAttestation] bodies
pub mod tags {
    pub const OBJECT_ID: u8 = 0x41;
    pub const ATTESTATION_KEY_ID: u8 = 0x45;
    pub const ATTESTATION_ALGO: u8 = 0x46;
    pub const CHALLENGE: u8 = 0x47;
}

/// Read a secure object along with an attestation signature
/// produced by the provided attestation key.
///
/// Responses decode as [SecureObjectPayload][crate::payload::SecureObjectPayload].
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      0x41     |      0x04     |          OBJECT_ID ...        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       ... OBJECT_ID           |      0x45     |      0x04     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      ATTESTATION_KEY_ID                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      0x46     |      0x01     |      0x21     |      0x47     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      0x10     |                                               |
/// +-+-+-+-+-+-+-+-+                                               +
/// /                     CHALLENGE (16 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct ReadWithAttestation {
    pub object_id: ObjectId,
    pub attestation_key_id: ObjectId,
    pub challenge: [u8; CHALLENGE_LEN],
}

impl ReadWithAttestation {
    /// Create a read request with a fresh random challenge
    pub fn new<R: RngCore + CryptoRng>(
        object_id: ObjectId,
        attestation_key_id: ObjectId,
        rng: &mut R,
    ) -> Self {
        let mut challenge = [0u8; CHALLENGE_LEN];
        rng.fill_bytes(&mut challenge);

        Self::with_challenge(object_id, attestation_key_id, challenge)
    }

    /// Create a read request with a fixed challenge
    pub fn with_challenge(
        object_id: ObjectId,
        attestation_key_id: ObjectId,
        challenge: [u8; CHALLENGE_LEN],
    ) -> Self {
        Self {
            object_id,
            attestation_key_id,
            challenge,
        }
    }
}

impl ApduStatic for ReadWithAttestation {
    const CLA: u8 = SE_APDU_CLA;
    const INS: u8 = Instruction::ReadAttested as u8;
}

impl Encode for ReadWithAttestation {
    type Error = ApduError;

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = TlvWriter::new(buff);

        w.put(tags::OBJECT_ID, &self.object_id)?
            .put(tags::ATTESTATION_KEY_ID, &self.attestation_key_id)?
            .put(tags::ATTESTATION_ALGO, &[ATTESTATION_ALGO])?
            .put(tags::CHALLENGE, &self.challenge)?;

        Ok(w.finish())
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(tlv_len(4) * 2 + tlv_len(1) + tlv_len(CHALLENGE_LEN))
    }
}

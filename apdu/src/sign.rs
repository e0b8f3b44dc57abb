// Copyright (c) 2022-2023 The MobileCoin Foundation

//! On-card signing APDUs

use encdec::{Decode, Encode};

use crate::{
    chain::{Chain, ObjectId},
    endian::reverse_components,
    tlv::{tlv_len, TlvWriter},
    ApduError, ApduStatic, Instruction, MAX_SIGN_PAYLOAD, SE_APDU_CLA,
};

/// Ed25519 signature length
pub const SIGNATURE_LEN: usize = 64;

/// Fixed signature response prefix (`TAG_1` with a two byte length of 64)
pub const SIGNATURE_PREFIX: [u8; 4] = [0x41, 0x82, 0x00, 0x40];

/// Pure EdDSA algorithm selector
pub const ALGO_EDDSA: u8 = 0xA3;

/// Crypto operation selector (sign)
const P1_SIGN: u8 = 0x0C;

/// Signature operation selector
const P2_SIGN: u8 = 0x09;

/// TLV tags used in sign bodies
pub mod tags {
    pub const KEY_ID: u8 = 0x41;
    pub const ALGO: u8 = 0x42;
    pub const MESSAGE: u8 = 0x43;
}

/// Sign a message using the chain's Ed25519 address key
///
/// Messages are limited to [MAX_SIGN_PAYLOAD] bytes, bodies over
/// 255 bytes use extended framing with a `00 40` trailer.
///
/// ## Encoding:
/// ```text
/// 41 04 <KEY_ID> | 42 01 A3 | 43 <BER_LEN> <MESSAGE>
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct SignEd25519<'a> {
    pub key_id: ObjectId,
    pub message: &'a [u8],
}

impl<'a> SignEd25519<'a> {
    /// Create a signing request, rejecting oversized messages
    pub fn new(chain: &Chain, message: &'a [u8]) -> Result<Self, ApduError> {
        if message.len() > MAX_SIGN_PAYLOAD {
            return Err(ApduError::PayloadTooLarge(message.len()));
        }

        Ok(Self {
            key_id: chain.id,
            message,
        })
    }
}

impl<'a> ApduStatic for SignEd25519<'a> {
    const CLA: u8 = SE_APDU_CLA;
    const INS: u8 = Instruction::Crypto as u8;

    fn p1(&self) -> u8 {
        P1_SIGN
    }

    fn p2(&self) -> u8 {
        P2_SIGN
    }

    fn trailer(&self, extended: bool) -> &'static [u8] {
        match extended {
            true => &[0x00, 0x40],
            false => &[0x00],
        }
    }
}

impl<'a> Encode for SignEd25519<'a> {
    type Error = ApduError;

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = TlvWriter::new(buff);

        w.put(tags::KEY_ID, &self.key_id)?
            .put(tags::ALGO, &[ALGO_EDDSA])?
            .put(tags::MESSAGE, self.message)?;

        Ok(w.finish())
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(tlv_len(self.key_id.len()) + tlv_len(1) + tlv_len(self.message.len()))
    }
}

/// Signature response, containing a little-endian corrected signature
///
/// ## Encoding:
/// ```text
/// 41 82 00 40 | R (32 bytes, big-endian) | S (32 bytes, big-endian)
/// ```
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SignatureResp {
    pub signature: [u8; SIGNATURE_LEN],
}

impl SignatureResp {
    pub fn new(signature: [u8; SIGNATURE_LEN]) -> Self {
        Self { signature }
    }
}

impl Encode for SignatureResp {
    type Error = ApduError;

    /// Encode as returned by the card, components big-endian
    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < SIGNATURE_PREFIX.len() + SIGNATURE_LEN {
            return Err(ApduError::InvalidLength);
        }

        buff[..4].copy_from_slice(&SIGNATURE_PREFIX);

        let s = &mut buff[4..][..SIGNATURE_LEN];
        s.copy_from_slice(&self.signature);
        reverse_components(s);

        Ok(SIGNATURE_PREFIX.len() + SIGNATURE_LEN)
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(SIGNATURE_PREFIX.len() + SIGNATURE_LEN)
    }
}

impl<'a> Decode<'a> for SignatureResp {
    type Output = Self;
    type Error = ApduError;

    /// Strip the fixed prefix and flip components to little-endian
    fn decode(buff: &'a [u8]) -> Result<(Self, usize), ApduError> {
        let n = SIGNATURE_PREFIX.len() + SIGNATURE_LEN;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&buff[SIGNATURE_PREFIX.len()..n]);
        reverse_components(&mut signature);

        Ok((Self { signature }, n))
    }
}

#[cfg(test)]
mod test {
    extern crate std;
    use std::vec;

    use super::*;
    use crate::{chain::SOLANA, ApduCmd};

    #[test]
    fn encode_short_sign() {
        let msg = [0x5a; 16];
        let s = SignEd25519::new(&SOLANA, &msg).unwrap();

        let mut buff = [0u8; 64];
        let n = s.encode_apdu(&mut buff).unwrap();

        assert_eq!(&buff[..5], &[0x80, 0x03, 0x0c, 0x09, 27]);
        assert_eq!(&buff[5..14], &[0x41, 0x04, 0x10, 0x00, 0x00, 0x01, 0x42, 0x01, 0xa3]);
        assert_eq!(&buff[14..16], &[0x43, 0x10]);
        assert_eq!(&buff[16..32], &msg);
        assert_eq!(&buff[32..n], &[0x00]);
    }

    #[test]
    fn encode_extended_sign() {
        let msg = vec![0x11; MAX_SIGN_PAYLOAD];
        let s = SignEd25519::new(&SOLANA, &msg).unwrap();

        let body = 6 + 3 + 4 + MAX_SIGN_PAYLOAD;
        assert_eq!(s.encode_len(), Ok(body));

        let mut buff = vec![0u8; s.apdu_len().unwrap()];
        let n = s.encode_apdu(&mut buff).unwrap();

        // Extended length
        assert_eq!(&buff[4..7], &[0x00, (body >> 8) as u8, body as u8]);
        // BER length for the message
        assert_eq!(&buff[16..19], &[0x43, 0x82, 0x03]);
        assert_eq!(buff[19], (MAX_SIGN_PAYLOAD & 0xff) as u8);
        // Extended trailer
        assert_eq!(&buff[n - 2..n], &[0x00, 0x40]);
        assert_eq!(n, 4 + 3 + body + 2);
    }

    #[test]
    fn sign_size_limit() {
        let msg = vec![0u8; MAX_SIGN_PAYLOAD + 1];
        assert_eq!(
            SignEd25519::new(&SOLANA, &msg),
            Err(ApduError::PayloadTooLarge(MAX_SIGN_PAYLOAD + 1))
        );
    }

    #[test]
    fn decode_signature() {
        let mut raw = [0u8; 68];
        raw[..4].copy_from_slice(&SIGNATURE_PREFIX);
        raw[4] = 0x01;
        raw[35] = 0x02;
        raw[36] = 0x03;
        raw[67] = 0x04;

        let (r, n) = SignatureResp::decode(&raw).unwrap();
        assert_eq!(n, 68);
        assert_eq!(r.signature[31], 0x01);
        assert_eq!(r.signature[0], 0x02);
        assert_eq!(r.signature[63], 0x03);
        assert_eq!(r.signature[32], 0x04);

        let mut buff = [0u8; 68];
        r.encode(&mut buff).unwrap();
        assert_eq!(buff, raw);
    }
}

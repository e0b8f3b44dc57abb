// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for secure element wallet cards
//!
//! This module provides the wire protocol used to talk to a smartcard-class
//! secure element over ISO-DEP: selecting the wallet applet, reading
//! attestation-signed data objects, provisioning address and asset objects,
//! and producing Ed25519 signatures.
//!
//! Commands follow the ISO7816 framing `[CLA, INS, P1, P2, Lc, BODY, Le]`,
//! with bodies encoded as BER-style TLV structures. Note that the outer `Lc`
//! uses a different length encoding ([tlv::encode_length]) to the TLV lengths
//! inside the body ([tlv::encode_tlv_length]), these must not be mixed.
//!

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod chain;
pub mod create;
pub mod endian;
pub mod frame;
pub mod payload;
pub mod policy;
pub mod prelude;
pub mod read;
pub mod select;
pub mod sign;
pub mod tlv;

/// ISO7816 inter-industry class, used for applet selection
pub const ISO_CLA: u8 = 0x00;

/// Proprietary class used by the secure element applet
pub const SE_APDU_CLA: u8 = 0x80;

/// Maximum message length accepted for on-card signing
pub const MAX_SIGN_PAYLOAD: usize = 900;

/// Maximum body length for short (single byte `Lc`) APDU framing
pub const SHORT_APDU_MAX: usize = 255;

/// Secure element APDU instruction codes
#[derive(Copy, Clone, Debug, PartialEq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Create / write a secure object
    Write = 0x01,

    /// Execute a crypto operation (signing)
    Crypto = 0x03,

    /// Read an object with attestation
    ReadAttested = 0x22,

    /// ISO7816 SELECT
    Select = 0xA4,
}

/// ISO7816 status words returned by the secure element
#[derive(Copy, Clone, Debug, PartialEq, strum::Display)]
pub enum StatusWord {
    /// Command completed successfully
    Ok,
    /// Referenced object does not exist
    NotFound,
    /// Security status / policy not satisfied
    SecurityNotSatisfied,
    /// Conditions of use not satisfied
    ConditionsNotSatisfied,
    /// Wrong data in command body
    WrongData,
    /// Instruction not supported
    InsNotSupported,
    /// Class not supported
    ClaNotSupported,
    /// Any other status word
    Other(u16),
}

impl StatusWord {
    pub const OK: u16 = 0x9000;
    pub const NOT_FOUND: u16 = 0x6A82;
    pub const SECURITY_NOT_SATISFIED: u16 = 0x6982;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const WRONG_DATA: u16 = 0x6A80;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// Split a raw response into data and status word
    pub fn split(resp: &[u8]) -> Result<(&[u8], u16), ApduError> {
        if resp.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        let (data, sw) = resp.split_at(resp.len() - 2);
        Ok((data, u16::from_be_bytes([sw[0], sw[1]])))
    }

    /// Encode as big-endian bytes for appending to a response
    pub fn to_bytes(&self) -> [u8; 2] {
        u16::from(*self).to_be_bytes()
    }
}

impl From<u16> for StatusWord {
    fn from(v: u16) -> Self {
        match v {
            Self::OK => Self::Ok,
            Self::NOT_FOUND => Self::NotFound,
            Self::SECURITY_NOT_SATISFIED => Self::SecurityNotSatisfied,
            Self::CONDITIONS_NOT_SATISFIED => Self::ConditionsNotSatisfied,
            Self::WRONG_DATA => Self::WrongData,
            Self::INS_NOT_SUPPORTED => Self::InsNotSupported,
            Self::CLA_NOT_SUPPORTED => Self::ClaNotSupported,
            _ => Self::Other(v),
        }
    }
}

impl From<StatusWord> for u16 {
    fn from(s: StatusWord) -> Self {
        match s {
            StatusWord::Ok => StatusWord::OK,
            StatusWord::NotFound => StatusWord::NOT_FOUND,
            StatusWord::SecurityNotSatisfied => StatusWord::SECURITY_NOT_SATISFIED,
            StatusWord::ConditionsNotSatisfied => StatusWord::CONDITIONS_NOT_SATISFIED,
            StatusWord::WrongData => StatusWord::WRONG_DATA,
            StatusWord::InsNotSupported => StatusWord::INS_NOT_SUPPORTED,
            StatusWord::ClaNotSupported => StatusWord::CLA_NOT_SUPPORTED,
            StatusWord::Other(v) => v,
        }
    }
}

/// APDU encode / decode errors
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum ApduError {
    /// Buffer or field length invalid
    #[cfg_attr(feature = "thiserror", error("invalid length"))]
    InvalidLength,

    /// Field encoding invalid
    #[cfg_attr(feature = "thiserror", error("invalid encoding"))]
    InvalidEncoding,

    /// Body exceeds the maximum the card accepts
    #[cfg_attr(feature = "thiserror", error("payload too large ({0} bytes)"))]
    PayloadTooLarge(usize),

    /// Required TLV field missing
    #[cfg_attr(feature = "thiserror", error("missing field: {0:#04x}"))]
    MissingField(u8),
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            #[allow(unreachable_patterns)]
            _ => ApduError::InvalidEncoding,
        }
    }
}

/// Static APDU header information for command objects,
/// the body is provided by the [encdec::Encode] implementation.
pub trait ApduStatic {
    /// Command class
    const CLA: u8;

    /// Command instruction
    const INS: u8;

    /// First parameter byte
    fn p1(&self) -> u8 {
        0x00
    }

    /// Second parameter byte
    fn p2(&self) -> u8 {
        0x00
    }

    /// Expected length trailer (`Le`), `extended` is set when the
    /// body required extended `Lc` framing
    fn trailer(&self, _extended: bool) -> &'static [u8] {
        &[0x00]
    }
}

/// Command objects are [ApduStatic] headers with an encodable body
pub trait ApduCmd: ApduStatic + encdec::Encode<Error = ApduError> {
    /// Compute the full framed length of this command
    fn apdu_len(&self) -> Result<usize, ApduError> {
        let n = self.encode_len()?;
        let extended = n > SHORT_APDU_MAX;

        Ok(4 + tlv::length_len(n) + n + self.trailer(extended).len())
    }

    /// Write the full framed command into the provided buffer
    fn encode_apdu(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let n = self.encode_len()?;
        let extended = n > SHORT_APDU_MAX;
        let trailer = self.trailer(extended);

        if buff.len() < self.apdu_len()? {
            return Err(ApduError::InvalidLength);
        }

        // Header
        buff[..4].copy_from_slice(&[Self::CLA, Self::INS, self.p1(), self.p2()]);
        let mut index = 4;

        // Body length (outer APDU length form)
        index += tlv::encode_length(n, &mut buff[index..])?;

        // Body
        index += self.encode(&mut buff[index..])?;

        // Expected length
        buff[index..][..trailer.len()].copy_from_slice(trailer);
        index += trailer.len();

        Ok(index)
    }

    /// Encode the full framed command into a new vector
    #[cfg(feature = "alloc")]
    fn to_vec(&self) -> Result<alloc::vec::Vec<u8>, ApduError> {
        let mut buff = alloc::vec![0u8; self.apdu_len()?];
        let n = self.encode_apdu(&mut buff)?;
        buff.truncate(n);
        Ok(buff)
    }
}

impl<T: ApduStatic + encdec::Encode<Error = ApduError>> ApduCmd for T {}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    #[test]
    fn status_word_split() {
        let (d, sw) = StatusWord::split(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(d, &[0x01, 0x02]);
        assert_eq!(StatusWord::from(sw), StatusWord::Ok);

        let (d, sw) = StatusWord::split(&[0x6a, 0x82]).unwrap();
        assert!(d.is_empty());
        assert_eq!(StatusWord::from(sw), StatusWord::NotFound);

        assert_eq!(StatusWord::split(&[0x90]), Err(ApduError::InvalidLength));
    }

    #[cfg(feature = "std")]
    #[test]
    fn apdu_error_display() {
        use std::{boxed::Box, string::ToString};

        let e: Box<dyn std::error::Error> = Box::new(ApduError::InvalidLength);
        assert_eq!(e.to_string(), "invalid length");
    }

    #[test]
    fn status_word_mapping() {
        for v in [0x9000, 0x6a82, 0x6982, 0x6985, 0x6a80, 0x6d00, 0x6e00, 0x6f00] {
            assert_eq!(u16::from(StatusWord::from(v)), v);
        }
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object policies and attributes
//!
//! Policy byte sequences are personalisation constants shared with the card
//! provisioning authority, they are compared byte-for-byte and must not be
//! re-derived.

use encdec::Decode;

use crate::{chain::ObjectId, ApduError};

/// Policy applied to (and expected on) address key objects
///
/// `LEN | AUTH_OBJECT_ID (any) | ACCESS_RULES (sign, read, gen)`
pub const ADDRESS_POLICY: [u8; 9] = [0x08, 0x00, 0x00, 0x00, 0x00, 0x20, 0x18, 0x20, 0x00];

/// Policy applied to (and expected on) asset binary objects
///
/// `LEN | AUTH_OBJECT_ID (any) | ACCESS_RULES (read, write)`
pub const ASSET_POLICY: [u8; 9] = [0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00];

/// Fixed identifier of the attestation key object (self-signed bootstrap object)
pub const ATTESTATION_KEY_ID: ObjectId = [0xF0, 0x00, 0x00, 0x12];

/// Fixed identifier of the stored asset object
pub const ASSET_OBJECT_ID: ObjectId = [0x10, 0x00, 0x01, 0x00];

/// Object class for asymmetric key pairs
pub const OBJECT_CLASS_KEY: u8 = 0x01;

/// Object class for binary files
pub const OBJECT_CLASS_BINARY: u8 = 0x0B;

/// Origin marker for keys generated inside the secure element
pub const ORIGIN_GENERATED: u8 = 0x02;

/// Authentication indicator marking an authentication object
pub const AUTH_INDICATOR_AUTH_OBJECT: u8 = 0x02;

/// Authentication indicator for regular objects
pub const AUTH_INDICATOR_NOT_SET: u8 = 0x01;

/// Offset of policy bytes within the attribute block
const POLICY_OFFSET: usize = 14;

/// Object origin values
#[derive(Copy, Clone, Debug, PartialEq, strum::Display, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Origin {
    /// Written from outside the secure element
    External = 0x01,
    /// Generated inside the secure element
    Generated = 0x02,
    /// Provisioned during personalisation
    Provisioned = 0x03,
}

/// Secure object attributes, parsed from `TAG_2` of an attested read
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           OBJECT_ID                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  OBJECT_CLASS |   AUTH_IND    |         AUTH_COUNTER          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            AUTH_ID                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       MAX_AUTH_ATTEMPTS       |                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
/// /                      POLICY (variable length)                 /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    ORIGIN     |
/// +-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SecureObjectAttributes<'a> {
    pub object_id: ObjectId,
    pub object_class: u8,
    pub authentication_indicator: u8,
    pub auth_counter: u16,
    pub auth_id: [u8; 4],
    pub max_auth_attempts: u16,
    pub policy: &'a [u8],
    pub origin: u8,
}

impl<'a> SecureObjectAttributes<'a> {
    /// Parse attributes from a `TAG_2` value
    pub fn parse(buff: &'a [u8]) -> Result<Self, ApduError> {
        Self::decode(buff).map(|(a, _n)| a)
    }

    /// Encode attributes into the provided buffer
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let n = self.encoded_len();
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        buff[0..4].copy_from_slice(&self.object_id);
        buff[4] = self.object_class;
        buff[5] = self.authentication_indicator;
        buff[6..8].copy_from_slice(&self.auth_counter.to_be_bytes());
        buff[8..12].copy_from_slice(&self.auth_id);
        buff[12..14].copy_from_slice(&self.max_auth_attempts.to_be_bytes());
        buff[POLICY_OFFSET..][..self.policy.len()].copy_from_slice(self.policy);
        buff[n - 1] = self.origin;

        Ok(n)
    }

    /// Compute encoded attribute length
    pub fn encoded_len(&self) -> usize {
        POLICY_OFFSET + self.policy.len() + 1
    }
}

impl<'a> Decode<'a> for SecureObjectAttributes<'a> {
    type Output = Self;
    type Error = ApduError;

    /// Decode attributes using fixed protocol offsets
    fn decode(buff: &'a [u8]) -> Result<(Self, usize), ApduError> {
        if buff.len() < POLICY_OFFSET + 1 {
            return Err(ApduError::InvalidLength);
        }

        let n = buff.len();

        let mut object_id = [0u8; 4];
        object_id.copy_from_slice(&buff[0..4]);

        let mut auth_id = [0u8; 4];
        auth_id.copy_from_slice(&buff[8..12]);

        Ok((
            Self {
                object_id,
                object_class: buff[4],
                authentication_indicator: buff[5],
                auth_counter: u16::from_be_bytes([buff[6], buff[7]]),
                auth_id,
                max_auth_attempts: u16::from_be_bytes([buff[12], buff[13]]),
                policy: &buff[POLICY_OFFSET..n - 1],
                origin: buff[n - 1],
            },
            n,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attributes_offsets() {
        let raw = [
            0x10, 0x00, 0x00, 0x01, // object id
            0x01, // class
            0x01, // auth indicator
            0x00, 0x03, // auth counter
            0x00, 0x00, 0x00, 0x00, // auth id
            0x00, 0x05, // max attempts
            0x08, 0x00, 0x00, 0x00, 0x00, 0x20, 0x18, 0x20, 0x00, // policy
            0x02, // origin
        ];

        let a = SecureObjectAttributes::parse(&raw).unwrap();

        assert_eq!(a.object_id, [0x10, 0x00, 0x00, 0x01]);
        assert_eq!(a.object_class, OBJECT_CLASS_KEY);
        assert_eq!(a.authentication_indicator, AUTH_INDICATOR_NOT_SET);
        assert_eq!(a.auth_counter, 3);
        assert_eq!(a.max_auth_attempts, 5);
        assert_eq!(a.policy, &ADDRESS_POLICY[..]);
        assert_eq!(a.origin, ORIGIN_GENERATED);

        let mut buff = [0u8; 32];
        let n = a.encode(&mut buff).unwrap();
        assert_eq!(&buff[..n], &raw[..]);
    }

    #[test]
    fn attributes_short() {
        assert_eq!(
            SecureObjectAttributes::parse(&[0u8; 14]),
            Err(ApduError::InvalidLength)
        );

        // Minimum length, empty policy
        let a = SecureObjectAttributes::parse(&[0u8; 15]).unwrap();
        assert!(a.policy.is_empty());
    }
}

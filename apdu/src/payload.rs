// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Attested secure object payloads
//!
//! Read responses are a sequence of TLV fields tagged `0x41..=0x46`:
//!
//! | Tag    | Field   | Content                                      |
//! |--------|---------|----------------------------------------------|
//! | `0x41` | `TAG_1` | object value (address or asset bytes)        |
//! | `0x42` | `TAG_2` | [SecureObjectAttributes][crate::policy::SecureObjectAttributes] |
//! | `0x43` | `TAG_3` | timestamp                                    |
//! | `0x44` | `TAG_4` | freshness (echoed challenge)                 |
//! | `0x45` | `TAG_5` | chip unique identifier                       |
//! | `0x46` | `TAG_6` | signature over `TAG_1‖TAG_2‖TAG_3‖TAG_4‖TAG_5` |
//!

use encdec::Decode;

use crate::{
    tlv::{tlv_len, TlvIter, TlvWriter},
    ApduError,
};

/// Payload field tags
#[derive(Copy, Clone, Debug, PartialEq, strum::Display, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    Tag1 = 0x41,
    Tag2 = 0x42,
    Tag3 = 0x43,
    Tag4 = 0x44,
    Tag5 = 0x45,
    Tag6 = 0x46,
}

/// Tags covered by the attestation signature, in signing order
pub const SIGNED_TAGS: [Tag; 5] = [Tag::Tag1, Tag::Tag2, Tag::Tag3, Tag::Tag4, Tag::Tag5];

/// Parsed attested payload, fields are `None` where absent
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecureObjectPayload<'a> {
    pub tag1: Option<&'a [u8]>,
    pub tag2: Option<&'a [u8]>,
    pub tag3: Option<&'a [u8]>,
    pub tag4: Option<&'a [u8]>,
    pub tag5: Option<&'a [u8]>,
    pub tag6: Option<&'a [u8]>,
}

impl<'a> SecureObjectPayload<'a> {
    /// Parse a payload from a read response (status word removed),
    /// unrecognised tags are skipped
    pub fn parse(buff: &'a [u8]) -> Result<Self, ApduError> {
        Self::decode(buff).map(|(p, _n)| p)
    }

    /// Fetch a field by tag
    pub fn get(&self, tag: Tag) -> Option<&'a [u8]> {
        match tag {
            Tag::Tag1 => self.tag1,
            Tag::Tag2 => self.tag2,
            Tag::Tag3 => self.tag3,
            Tag::Tag4 => self.tag4,
            Tag::Tag5 => self.tag5,
            Tag::Tag6 => self.tag6,
        }
    }

    /// Set a field by tag
    pub fn set(&mut self, tag: Tag, value: &'a [u8]) {
        let f = match tag {
            Tag::Tag1 => &mut self.tag1,
            Tag::Tag2 => &mut self.tag2,
            Tag::Tag3 => &mut self.tag3,
            Tag::Tag4 => &mut self.tag4,
            Tag::Tag5 => &mut self.tag5,
            Tag::Tag6 => &mut self.tag6,
        };
        *f = Some(value);
    }

    /// Fetch a required field
    pub fn require(&self, tag: Tag) -> Result<&'a [u8], ApduError> {
        self.get(tag).ok_or(ApduError::MissingField(tag as u8))
    }

    /// Iterate over the signed fields in signing order, absent fields are skipped
    pub fn signed_fields(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        SIGNED_TAGS.iter().filter_map(|t| self.get(*t))
    }

    /// Length of the signed message (`TAG_1‖..‖TAG_5`)
    pub fn signed_len(&self) -> usize {
        self.signed_fields().map(|f| f.len()).sum()
    }

    /// Write the signed message (`TAG_1‖..‖TAG_5`) into the provided buffer
    pub fn signed_message(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < self.signed_len() {
            return Err(ApduError::InvalidLength);
        }

        let mut index = 0;
        for f in self.signed_fields() {
            buff[index..][..f.len()].copy_from_slice(f);
            index += f.len();
        }

        Ok(index)
    }

    /// Build the signed message as a vector
    #[cfg(feature = "alloc")]
    pub fn signed_message_vec(&self) -> alloc::vec::Vec<u8> {
        let mut v = alloc::vec::Vec::with_capacity(self.signed_len());
        for f in self.signed_fields() {
            v.extend_from_slice(f);
        }
        v
    }

    /// Compute the TLV encoded length of present fields
    pub fn encoded_len(&self) -> usize {
        SIGNED_TAGS
            .iter()
            .chain(core::iter::once(&Tag::Tag6))
            .filter_map(|t| self.get(*t))
            .map(|v| tlv_len(v.len()))
            .sum()
    }

    /// TLV encode present fields in tag order
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = TlvWriter::new(buff);

        for t in SIGNED_TAGS.iter().chain(core::iter::once(&Tag::Tag6)) {
            if let Some(v) = self.get(*t) {
                w.put(*t as u8, v)?;
            }
        }

        Ok(w.finish())
    }
}

impl<'a> Decode<'a> for SecureObjectPayload<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self, usize), ApduError> {
        let mut p = Self::default();

        for f in TlvIter::new(buff) {
            let (tag, value) = f?;

            match Tag::try_from(tag) {
                Ok(t) => p.set(t, value),
                Err(_) => {
                    #[cfg(feature = "log")]
                    log::trace!("skipping unrecognised tag: {:#04x}", tag);
                }
            }
        }

        Ok((p, buff.len()))
    }
}

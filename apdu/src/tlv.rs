// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TLV (tag-length-value) codec used by secure element payloads
//!
//! Two length encodings exist in the protocol:
//!
//! - [encode_length] for the outer APDU `Lc` field (single byte up to 255,
//!   `0x00` followed by a big-endian `u16` for extended APDUs)
//! - [encode_tlv_length] for BER-style lengths inside TLV bodies (single byte
//!   up to 127, `0x81 NN` up to 255, `0x82 NN NN` above)
//!

use crate::{ApduError, SHORT_APDU_MAX};

/// Short form limit for BER TLV lengths
const TLV_SHORT_MAX: usize = 0x7F;

/// Marker for one byte BER length
const TLV_LEN_1: u8 = 0x81;

/// Marker for two byte BER length
const TLV_LEN_2: u8 = 0x82;

/// Compute the encoded size of an outer APDU length
pub const fn length_len(n: usize) -> usize {
    if n <= SHORT_APDU_MAX {
        1
    } else {
        3
    }
}

/// Encode an outer APDU (`Lc`) length
pub fn encode_length(n: usize, buff: &mut [u8]) -> Result<usize, ApduError> {
    if n > u16::MAX as usize {
        return Err(ApduError::PayloadTooLarge(n));
    }

    let l = length_len(n);
    if buff.len() < l {
        return Err(ApduError::InvalidLength);
    }

    if n <= SHORT_APDU_MAX {
        buff[0] = n as u8;
    } else {
        buff[0] = 0x00;
        buff[1..3].copy_from_slice(&(n as u16).to_be_bytes());
    }

    Ok(l)
}

/// Compute the encoded size of a BER TLV length
pub const fn tlv_length_len(n: usize) -> usize {
    if n <= TLV_SHORT_MAX {
        1
    } else if n <= 0xFF {
        2
    } else {
        3
    }
}

/// Encode a BER TLV length
pub fn encode_tlv_length(n: usize, buff: &mut [u8]) -> Result<usize, ApduError> {
    if n > u16::MAX as usize {
        return Err(ApduError::PayloadTooLarge(n));
    }

    let l = tlv_length_len(n);
    if buff.len() < l {
        return Err(ApduError::InvalidLength);
    }

    match l {
        1 => buff[0] = n as u8,
        2 => {
            buff[0] = TLV_LEN_1;
            buff[1] = n as u8;
        }
        _ => {
            buff[0] = TLV_LEN_2;
            buff[1..3].copy_from_slice(&(n as u16).to_be_bytes());
        }
    }

    Ok(l)
}

/// Decode a BER TLV length, returning the length and bytes consumed
pub fn decode_tlv_length(buff: &[u8]) -> Result<(usize, usize), ApduError> {
    match buff.first() {
        None => Err(ApduError::InvalidLength),
        Some(&TLV_LEN_1) if buff.len() >= 2 => Ok((buff[1] as usize, 2)),
        Some(&TLV_LEN_2) if buff.len() >= 3 => {
            Ok((u16::from_be_bytes([buff[1], buff[2]]) as usize, 3))
        }
        Some(&TLV_LEN_1) | Some(&TLV_LEN_2) => Err(ApduError::InvalidLength),
        Some(&b) if b as usize <= TLV_SHORT_MAX => Ok((b as usize, 1)),
        Some(_) => Err(ApduError::InvalidEncoding),
    }
}

/// Compute the encoded size of a TLV field
pub const fn tlv_len(value_len: usize) -> usize {
    1 + tlv_length_len(value_len) + value_len
}

/// Write a single TLV field
pub fn encode_tlv(tag: u8, value: &[u8], buff: &mut [u8]) -> Result<usize, ApduError> {
    if buff.len() < tlv_len(value.len()) {
        return Err(ApduError::InvalidLength);
    }

    buff[0] = tag;
    let mut index = 1;

    index += encode_tlv_length(value.len(), &mut buff[index..])?;

    buff[index..][..value.len()].copy_from_slice(value);
    index += value.len();

    Ok(index)
}

/// Helper for sequentially writing TLV fields into a buffer
pub struct TlvWriter<'a> {
    buff: &'a mut [u8],
    index: usize,
}

impl<'a> TlvWriter<'a> {
    /// Create a writer over the provided buffer
    pub fn new(buff: &'a mut [u8]) -> Self {
        Self { buff, index: 0 }
    }

    /// Append a TLV field
    pub fn put(&mut self, tag: u8, value: &[u8]) -> Result<&mut Self, ApduError> {
        self.index += encode_tlv(tag, value, &mut self.buff[self.index..])?;
        Ok(self)
    }

    /// Number of bytes written
    pub fn finish(self) -> usize {
        self.index
    }
}

/// Iterator over TLV fields in a buffer, yielding `(tag, value)` pairs
///
/// Malformed or truncated fields yield an error and end iteration.
#[derive(Clone, Debug)]
pub struct TlvIter<'a> {
    buff: &'a [u8],
    index: usize,
    failed: bool,
}

impl<'a> TlvIter<'a> {
    pub fn new(buff: &'a [u8]) -> Self {
        Self {
            buff,
            index: 0,
            failed: false,
        }
    }

    /// Find the first field with the provided tag
    pub fn find_tag(buff: &'a [u8], tag: u8) -> Result<Option<&'a [u8]>, ApduError> {
        for f in Self::new(buff) {
            let (t, v) = f?;
            if t == tag {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<(u8, &'a [u8]), ApduError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.buff.len() {
            return None;
        }

        let tag = self.buff[self.index];
        let rest = &self.buff[self.index + 1..];

        let (n, l) = match decode_tlv_length(rest) {
            Ok(v) => v,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        if rest.len() < l + n {
            self.failed = true;
            return Some(Err(ApduError::InvalidLength));
        }

        let value = &rest[l..][..n];
        self.index += 1 + l + n;

        Some(Ok((tag, value)))
    }
}

#[cfg(test)]
mod test {
    extern crate std;
    use std::vec;

    use super::*;

    #[test]
    fn outer_length_forms() {
        let mut b = [0u8; 3];

        assert_eq!(encode_length(0, &mut b), Ok(1));
        assert_eq!(b[0], 0x00);

        assert_eq!(encode_length(255, &mut b), Ok(1));
        assert_eq!(b[0], 0xff);

        assert_eq!(encode_length(256, &mut b), Ok(3));
        assert_eq!(b, [0x00, 0x01, 0x00]);

        assert_eq!(encode_length(0x1234, &mut b), Ok(3));
        assert_eq!(b, [0x00, 0x12, 0x34]);

        assert_eq!(
            encode_length(0x10000, &mut b),
            Err(ApduError::PayloadTooLarge(0x10000))
        );
    }

    #[test]
    fn tlv_length_forms() {
        let mut b = [0u8; 3];

        assert_eq!(encode_tlv_length(127, &mut b), Ok(1));
        assert_eq!(b[0], 0x7f);

        assert_eq!(encode_tlv_length(128, &mut b), Ok(2));
        assert_eq!(&b[..2], &[0x81, 0x80]);

        assert_eq!(encode_tlv_length(255, &mut b), Ok(2));
        assert_eq!(&b[..2], &[0x81, 0xff]);

        assert_eq!(encode_tlv_length(256, &mut b), Ok(3));
        assert_eq!(b, [0x82, 0x01, 0x00]);

        // The two length encodings diverge between 128 and 255
        let mut o = [0u8; 3];
        assert_eq!(encode_length(200, &mut o), Ok(1));
        assert_eq!(encode_tlv_length(200, &mut b), Ok(2));
        assert_ne!(o[0], b[0]);
    }

    #[test]
    fn tlv_roundtrip_lengths() {
        for n in [0usize, 1, 127, 128, 255, 256, 65535] {
            let value: vec::Vec<u8> = (0..n).map(|i| i as u8).collect();
            let mut buff = vec![0u8; tlv_len(n)];

            let l = encode_tlv(0x41, &value, &mut buff).unwrap();
            assert_eq!(l, tlv_len(n), "encoded length mismatch for {n}");

            let mut i = TlvIter::new(&buff[..l]);
            let (tag, v) = i.next().unwrap().unwrap();
            assert_eq!(tag, 0x41);
            assert_eq!(v, &value[..], "value mismatch for {n}");
            assert!(i.next().is_none());
        }
    }

    #[test]
    fn tlv_truncated() {
        // Length claims 4 bytes, only 2 available
        let buff = [0x41, 0x04, 0x01, 0x02];
        let r: vec::Vec<_> = TlvIter::new(&buff).collect();
        assert_eq!(r, vec![Err(ApduError::InvalidLength)]);

        // Missing length bytes
        let buff = [0x41, 0x82, 0x01];
        let r: vec::Vec<_> = TlvIter::new(&buff).collect();
        assert_eq!(r, vec![Err(ApduError::InvalidLength)]);
    }

    #[test]
    fn tlv_writer() {
        let mut buff = [0u8; 16];
        let mut w = TlvWriter::new(&mut buff);
        w.put(0x41, &[0xaa, 0xbb]).unwrap().put(0x46, &[0x21]).unwrap();
        let n = w.finish();

        assert_eq!(&buff[..n], &[0x41, 0x02, 0xaa, 0xbb, 0x46, 0x01, 0x21]);
        assert_eq!(TlvIter::find_tag(&buff[..n], 0x46), Ok(Some(&[0x21][..])));
        assert_eq!(TlvIter::find_tag(&buff[..n], 0x47), Ok(None));
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Byte order helpers
//!
//! The secure element returns curve values as big-endian 32-byte groups,
//! these must be flipped per-group (not as one reversed blob) to produce
//! the little-endian encodings used by Ed25519.

/// Size of a single curve component
pub const COMPONENT_LEN: usize = 32;

/// Reverse each 32-byte chunk of the provided buffer in place
///
/// A trailing partial chunk is reversed independently.
pub fn reverse_components(buff: &mut [u8]) {
    for c in buff.chunks_mut(COMPONENT_LEN) {
        c.reverse();
    }
}

/// Return a copy of `bytes` with each 32-byte chunk reversed
#[cfg(feature = "alloc")]
pub fn to_little_endian(bytes: &[u8]) -> alloc::vec::Vec<u8> {
    let mut v = bytes.to_vec();
    reverse_components(&mut v);
    v
}

/// Reverse the components of a fixed size array
pub fn to_little_endian_array<const N: usize>(bytes: &[u8; N]) -> [u8; N] {
    let mut b = *bytes;
    reverse_components(&mut b);
    b
}

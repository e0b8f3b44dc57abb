// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Applet selection APDU

use encdec::Encode;

use crate::{ApduError, ApduStatic, Instruction, ISO_CLA};

/// Wallet applet identifier
pub const WALLET_AID: [u8; 16] = [
    0xA0, 0x00, 0x00, 0x03, 0x96, 0x54, 0x53, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00,
];

/// Select an applet by identifier, must be issued at the start of every session
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                              AID                              /
/// /                      (16-byte identifier)                     /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SelectApplet<'a> {
    pub aid: &'a [u8],
}

impl<'a> SelectApplet<'a> {
    /// Select an arbitrary applet
    pub fn new(aid: &'a [u8]) -> Self {
        Self { aid }
    }
}

impl Default for SelectApplet<'static> {
    /// Select the wallet applet
    fn default() -> Self {
        Self { aid: &WALLET_AID }
    }
}

impl<'a> ApduStatic for SelectApplet<'a> {
    const CLA: u8 = ISO_CLA;
    const INS: u8 = Instruction::Select as u8;

    /// Select by name
    fn p1(&self) -> u8 {
        0x04
    }
}

impl<'a> Encode for SelectApplet<'a> {
    type Error = ApduError;

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < self.aid.len() {
            return Err(ApduError::InvalidLength);
        }

        buff[..self.aid.len()].copy_from_slice(self.aid);

        Ok(self.aid.len())
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(self.aid.len())
    }
}

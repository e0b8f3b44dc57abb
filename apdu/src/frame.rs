// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Incoming command framing, used by card-side implementations

use encdec::Decode;

use crate::ApduError;

/// Parsed command frame
///
/// Bodies with a leading `00` length byte and at least two following
/// bytes are treated as extended (`00 HI LO`) framing.
#[derive(Clone, PartialEq, Debug)]
pub struct CommandFrame<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub body: &'a [u8],
    /// Trailing expected length bytes, if any
    pub le: &'a [u8],
}

impl<'a> Decode<'a> for CommandFrame<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self, usize), ApduError> {
        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        let (cla, ins, p1, p2) = (buff[0], buff[1], buff[2], buff[3]);

        // Header only
        if buff.len() == 4 {
            return Ok((
                Self {
                    cla,
                    ins,
                    p1,
                    p2,
                    body: &[],
                    le: &[],
                },
                4,
            ));
        }

        let (n, index) = match buff[4] {
            0x00 if buff.len() >= 7 => (u16::from_be_bytes([buff[5], buff[6]]) as usize, 7),
            v => (v as usize, 5),
        };

        if buff.len() < index + n {
            return Err(ApduError::InvalidLength);
        }

        Ok((
            Self {
                cla,
                ins,
                p1,
                p2,
                body: &buff[index..][..n],
                le: &buff[index + n..],
            },
            buff.len(),
        ))
    }
}

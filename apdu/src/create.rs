// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Object provisioning APDUs
//!
//! Both commands use `80 01 06 00` framing with no expected length
//! trailer, the card responds with a bare status word.

use encdec::Encode;

use crate::{
    chain::Chain,
    policy::{ADDRESS_POLICY, ASSET_OBJECT_ID, ASSET_POLICY},
    tlv::{tlv_len, TlvWriter},
    ApduError, ApduStatic, Instruction, SE_APDU_CLA,
};

/// Object type selector for write commands
pub const P1_CREATE: u8 = 0x06;

/// Asset identifier length
pub const ASSET_ID_LEN: usize = 32;

/// Stored asset length (chain tag followed by asset identifier)
pub const STORED_ASSET_LEN: usize = 1 + ASSET_ID_LEN;

/// TLV tags used in create bodies
pub mod tags {
    pub const POLICY: u8 = 0x11;
    pub const OBJECT_ID: u8 = 0x41;
    pub const CURVE: u8 = 0x42;
    pub const SIZE: u8 = 0x43;
    pub const DATA: u8 = 0x44;
}

/// Generate an address key pair for the provided chain
///
/// ## Encoding:
/// ```text
/// 11 09 <ADDRESS_POLICY> | 41 04 <CHAIN_ID> | 42 01 <CURVE>
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct CreateAddress<'a> {
    pub chain: &'a Chain,
}

impl<'a> CreateAddress<'a> {
    pub fn new(chain: &'a Chain) -> Self {
        Self { chain }
    }
}

impl<'a> ApduStatic for CreateAddress<'a> {
    const CLA: u8 = SE_APDU_CLA;
    const INS: u8 = Instruction::Write as u8;

    fn p1(&self) -> u8 {
        P1_CREATE
    }

    fn trailer(&self, _extended: bool) -> &'static [u8] {
        &[]
    }
}

impl<'a> Encode for CreateAddress<'a> {
    type Error = ApduError;

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = TlvWriter::new(buff);

        w.put(tags::POLICY, &ADDRESS_POLICY)?
            .put(tags::OBJECT_ID, &self.chain.id)?
            .put(tags::CURVE, &[self.chain.curve as u8])?;

        Ok(w.finish())
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(tlv_len(ADDRESS_POLICY.len()) + tlv_len(self.chain.id.len()) + tlv_len(1))
    }
}

/// Write the asset identifier object for the provided chain
///
/// ## Encoding:
/// ```text
/// 11 09 <ASSET_POLICY> | 41 04 <ASSET_OBJECT_ID> | 43 02 <SIZE (u16 BE)>
///   | 44 21 <CHAIN_TAG> <ASSET_ID (32 bytes)>
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct CreateAsset<'a> {
    pub chain: &'a Chain,
    pub asset: [u8; ASSET_ID_LEN],
}

impl<'a> CreateAsset<'a> {
    pub fn new(chain: &'a Chain, asset: [u8; ASSET_ID_LEN]) -> Self {
        Self { chain, asset }
    }

    /// Stored object value, chain tag followed by the asset identifier
    pub fn value(&self) -> [u8; STORED_ASSET_LEN] {
        let mut v = [0u8; STORED_ASSET_LEN];
        v[0] = self.chain.tag();
        v[1..].copy_from_slice(&self.asset);
        v
    }
}

impl<'a> ApduStatic for CreateAsset<'a> {
    const CLA: u8 = SE_APDU_CLA;
    const INS: u8 = Instruction::Write as u8;

    fn p1(&self) -> u8 {
        P1_CREATE
    }

    fn trailer(&self, _extended: bool) -> &'static [u8] {
        &[]
    }
}

impl<'a> Encode for CreateAsset<'a> {
    type Error = ApduError;

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = TlvWriter::new(buff);

        w.put(tags::POLICY, &ASSET_POLICY)?
            .put(tags::OBJECT_ID, &ASSET_OBJECT_ID)?
            .put(tags::SIZE, &(STORED_ASSET_LEN as u16).to_be_bytes())?
            .put(tags::DATA, &self.value())?;

        Ok(w.finish())
    }

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(tlv_len(ASSET_POLICY.len())
            + tlv_len(ASSET_OBJECT_ID.len())
            + tlv_len(2)
            + tlv_len(STORED_ASSET_LEN))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{chain::SOLANA, ApduCmd};

    #[test]
    fn encode_create_address() {
        let mut buff = [0u8; 64];
        let n = CreateAddress::new(&SOLANA).encode_apdu(&mut buff).unwrap();

        assert_eq!(
            hex::encode(&buff[..n]),
            concat!(
                "80010600",
                "14",
                "1109080000000020182000",
                "410410000001",
                "420140",
            )
        );
    }

    #[test]
    fn encode_create_asset() {
        let c = CreateAsset::new(&SOLANA, [0xab; ASSET_ID_LEN]);

        let mut buff = [0u8; 128];
        let n = c.encode_apdu(&mut buff).unwrap();

        assert_eq!(&buff[..5], &[0x80, 0x01, 0x06, 0x00, 0x38]);
        assert_eq!(&buff[5..16], &[0x11, 0x09, 0x08, 0, 0, 0, 0, 0, 0x14, 0, 0]);
        assert_eq!(&buff[16..22], &[0x41, 0x04, 0x10, 0x00, 0x01, 0x00]);
        assert_eq!(&buff[22..26], &[0x43, 0x02, 0x00, 0x21]);
        assert_eq!(&buff[26..29], &[0x44, 0x21, 0x01]);
        assert_eq!(&buff[29..n], &[0xab; ASSET_ID_LEN]);
        assert_eq!(n, 61);
    }
}

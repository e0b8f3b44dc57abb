// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Supported chain definitions
//!

use strum::{Display, EnumString};

/// Secure element object identifier
pub type ObjectId = [u8; 4];

/// Curve selectors understood by the secure element
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Curve {
    /// NIST P-256, used by the attestation key
    #[strum(serialize = "p256")]
    NistP256 = 0x03,

    /// Ed25519, used for wallet keys
    #[strum(serialize = "ed25519")]
    Ed25519 = 0x40,
}

/// Target blockchain definition
///
/// Chains are compile-time constants, see [SOLANA].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Chain {
    /// Symbolic chain name
    pub name: ChainName,

    /// Object identifier of the chain's address key on the card
    pub id: ObjectId,

    /// Curve used by the chain's address key
    pub curve: Curve,

    /// Native asset identifier, used as the default asset
    pub native_asset: [u8; 32],
}

/// Supported chain names, the discriminant is the one byte chain
/// tag stored alongside asset identifiers
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, num_enum::TryFromPrimitive,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ChainName {
    Solana = 0x01,
}

impl ChainName {
    /// Fetch the chain definition for this name
    pub const fn chain(&self) -> &'static Chain {
        match self {
            ChainName::Solana => &SOLANA,
        }
    }
}

impl Chain {
    /// One byte chain tag
    pub const fn tag(&self) -> u8 {
        self.name as u8
    }
}

impl core::fmt::Display for Chain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.name, self.curve)
    }
}

/// Solana mainnet
pub const SOLANA: Chain = Chain {
    name: ChainName::Solana,
    id: [0x10, 0x00, 0x00, 0x01],
    curve: Curve::Ed25519,
    // So11111111111111111111111111111111111111112
    native_asset: [
        0x06, 0x9b, 0x88, 0x57, 0xfe, 0xab, 0x81, 0x84, 0xfb, 0x68, 0x7f, 0x63, 0x46, 0x18, 0xc0,
        0x35, 0xda, 0xc4, 0x39, 0xdc, 0x1a, 0xeb, 0x3b, 0x55, 0x98, 0xa0, 0xf0, 0x00, 0x00, 0x00,
        0x00, 0x01,
    ],
};

/// All supported chains
pub const CHAINS: &[Chain] = &[SOLANA];

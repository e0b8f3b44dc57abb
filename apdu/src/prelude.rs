// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects

pub use crate::{
    chain::*,
    create::{CreateAddress, CreateAsset, ASSET_ID_LEN, STORED_ASSET_LEN},
    endian::*,
    frame::CommandFrame,
    payload::{SecureObjectPayload, Tag},
    policy::*,
    read::{ReadWithAttestation, CHALLENGE_LEN},
    select::{SelectApplet, WALLET_AID},
    sign::{SignEd25519, SignatureResp, SIGNATURE_LEN},
    tlv::*,
    ApduCmd, ApduError, ApduStatic, Instruction, StatusWord, MAX_SIGN_PAYLOAD,
};

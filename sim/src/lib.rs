// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software secure element for NFC wallet development and testing
//!
//! [SimCard] processes raw command APDUs in-process, [serve] exposes a card
//! over TCP for use with the `transport_tcp` host transport.

mod card;
pub use card::*;

mod server;
pub use server::*;

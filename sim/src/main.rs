// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
};

use clap::Parser;
use log::{debug, info, LevelFilter};
use tokio::{net::TcpListener, sync::Mutex};

use nfc_wallet_apdu::policy::Origin;
use nfc_wallet_sim::*;

/// Software secure element
///
/// Serves the wallet applet protocol over TCP for use with
/// `nfc-wallet-cli --target tcp` or host library tests.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Address to listen on
    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    addr: IpAddr,

    /// Port to listen on
    #[clap(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Report generated address keys as externally written
    #[clap(long)]
    external_origin: bool,

    /// Corrupt attested values after signing
    #[clap(long)]
    tamper_attestation: bool,

    /// Sign messages with a key other than the stored address key
    #[clap(long)]
    wrong_sign_key: bool,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    let faults = Faults {
        address_origin: args.external_origin.then_some(Origin::External as u8),
        tamper_attestation: args.tamper_attestation,
        wrong_sign_key: args.wrong_sign_key,
        ..Default::default()
    };

    info!("Launching simulator...");
    debug!("Faults: {:?}", faults);

    let card = Arc::new(Mutex::new(SimCard::new(faults)));
    let listener = TcpListener::bind((args.addr, args.port)).await?;

    // Serve until exit signal
    tokio::select!(
        r = serve(listener, card) => {
            r?;
        }
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}

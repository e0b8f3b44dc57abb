// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with NFC secure element wallets

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};

use nfc_wallet::{
    apdu::chain::ChainName,
    config::Config,
    event::SessionEvent,
    rpc::JsonRpcClient,
    transport::GenericTransport,
    tx::{
        NfcSigner, Orchestrator, PreparedTransaction, SignerKind, Submission, Submitter,
        TransactionSigner,
    },
    Filter, NfcProvider, SecureElement,
};

mod helpers;
use helpers::*;

/// NFC wallet command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Supported transports for reader discovery
    #[clap(long, value_enum, default_value = "any")]
    target: Filter,

    /// Reader index (where more than one reader is available)
    #[clap(long, default_value = "0")]
    reader_index: usize,

    /// Configuration file (TOML)
    #[clap(long, env = "NFC_WALLET_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available readers
    List,

    /// Read (or provision) the card address and asset
    Read {
        /// Target chain
        #[clap(long, default_value = "solana")]
        chain: ChainName,
    },

    /// Sign a hex encoded message with the card key
    Sign {
        /// Target chain
        #[clap(long, default_value = "solana")]
        chain: ChainName,

        /// Hex encoded message
        #[clap(long)]
        message: HexData,
    },

    /// Sign a base64 encoded transaction message with the card key and submit it
    Submit {
        /// Target chain
        #[clap(long, default_value = "solana")]
        chain: ChainName,

        /// Base64 encoded transaction message, the card address must be the
        /// only required signer
        #[clap(long)]
        message: B64Data,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    // Load configuration
    let config = match &args.config {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };

    debug!("Using transport: {:?}", args.target);

    // List available readers
    let p = NfcProvider::new();
    let readers = p.list_readers(args.target).await;
    if readers.is_empty() {
        return Err(anyhow::anyhow!("No readers found"));
    }

    // Handle list command
    if args.cmd == Actions::List {
        info!("Readers:");
        for (i, r) in readers.iter().enumerate() {
            info!("  {}: {}", i, r);
        }

        return Ok(());
    }

    // Select reader by index
    if args.reader_index >= readers.len() {
        return Err(anyhow::anyhow!(
            "Invalid reader index: {} (max: {})",
            args.reader_index,
            readers.len() - 1
        ));
    }

    debug!(
        "Using reader {}: {}",
        args.reader_index, readers[args.reader_index]
    );

    // Connect to reader
    let se = match p.connect(&readers[args.reader_index]) {
        Ok(v) => v.with_config(config.session.clone()),
        Err(e) => {
            error!("Failed to connect to reader: {}", readers[args.reader_index]);
            return Err(e.into());
        }
    };

    // Display session progress
    let mut events = se.subscribe();
    tokio::spawn(async move {
        while let Ok(e) = events.recv().await {
            match e {
                SessionEvent::AwaitingTap => info!("Tap card to continue"),
                e => debug!("Session event: {:?}", e),
            }
        }
    });

    // Cancel any active session on ctrl+c
    let se1 = se.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancelling");
            se1.close();
        }
    });

    // Execute command
    execute(se, config, args.cmd).await?;

    Ok(())
}

/// Execute a command with the provided secure element
async fn execute(
    se: SecureElement<GenericTransport>,
    config: Config,
    cmd: Actions,
) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Read { chain } => {
            let d = se.read_secure_element(chain.chain()).await?;

            info!("chain:   {}", d.chain);
            info!("address: {}", d.address);
            info!("asset:   {}", d.asset);
        }
        Actions::Sign { chain, message } => {
            info!("signing {} byte message", message.0.len());

            let s = se.sign_with_nfc_keypair(chain.chain(), message.as_ref()).await?;

            info!("signature: {}", hex::encode(s.0));
        }
        Actions::Submit { chain, message } => {
            let chain = *chain.chain();

            // Resolve card address for use as the transaction signer
            let d = se.read_secure_element(&chain).await?;
            info!("using signer: {}", d.address);

            let mut batch = [PreparedTransaction::new(
                "cli",
                d.address,
                vec![TransactionSigner::new(d.address, SignerKind::Nfc)],
                message.0,
            )?];

            let rpc = Arc::new(JsonRpcClient::new(&config.rpc)?);
            let submitter = Submitter::new(rpc.clone(), rpc, config.submit.clone());
            let o = Orchestrator::new(submitter)
                .with_signer(SignerKind::Nfc, Arc::new(NfcSigner::new(se, chain)));

            let mut progress = |id: &str, s: &TransactionSigner| {
                info!("{}: {} signer {} {}", id, s.kind, s.key, s.state)
            };

            match o.sign_and_submit(&mut batch, &mut progress).await? {
                Submission::Signature(s) => info!("transaction confirmed: {}", s),
                Submission::Bundle(id) => info!("bundle landed: {}", id),
            }
        }
        _ => unreachable!(),
    }

    Ok(())
}

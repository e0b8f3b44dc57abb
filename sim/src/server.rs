// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP server exposing a [SimCard] to host transports
//!
//! Frames are a big-endian `u32` length followed by the raw APDU (requests)
//! or response data and status word (responses). Each connection is treated
//! as a new card tap.

use std::{io, sync::Arc};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

use crate::SimCard;

/// Default simulator port
pub const DEFAULT_PORT: u16 = 1237;

/// Maximum accepted frame length
pub const MAX_FRAME_LEN: usize = 4096;

/// Accept connections and serve APDU exchanges until the listener fails
pub async fn serve(listener: TcpListener, card: Arc<Mutex<SimCard>>) -> io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;

        debug!("Connection from {}", addr);

        let card = card.clone();
        tokio::spawn(async move {
            match handle_connection(stream, card).await {
                Ok(_) => debug!("Connection from {} closed", addr),
                Err(e) => warn!("Connection from {} failed: {:?}", addr, e),
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, card: Arc<Mutex<SimCard>>) -> io::Result<()> {
    card.lock().await.reset();

    loop {
        // Read frame length, EOF here is a clean disconnect
        let mut len = [0u8; 4];
        match stream.read_exact(&mut len).await {
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let n = u32::from_be_bytes(len) as usize;
        if n > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame too large ({n} bytes)"),
            ));
        }

        let mut req = vec![0u8; n];
        stream.read_exact(&mut req).await?;

        let resp = card.lock().await.process(&req);

        stream.write_all(&(resp.len() as u32).to_be_bytes()).await?;
        stream.write_all(&resp).await?;
    }
}

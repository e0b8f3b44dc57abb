// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP transport for the software secure element
//!
//! Frames are a big-endian `u32` length followed by the payload in each direction.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{Transport, TransportError};

/// Maximum accepted response frame length
const MAX_FRAME_LEN: usize = 4096;

/// TCP transport options
#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct TcpOptions {
    /// Simulator address
    #[clap(long = "tcp-addr", default_value = "127.0.0.1")]
    pub addr: IpAddr,

    /// Simulator port
    #[clap(long = "tcp-port", default_value = "1237")]
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 1237,
        }
    }
}

impl TcpOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// Transport using a TCP connection to the simulator,
/// each connection is treated as a card tap
#[derive(Debug)]
pub struct TcpTransport {
    opts: TcpOptions,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(opts: TcpOptions) -> Self {
        Self { opts, stream: None }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let addr = self.opts.socket_addr();

        debug!("Connecting to {}", addr);

        let s = TcpStream::connect(addr).await?;
        s.set_nodelay(true)?;

        self.stream = Some(s);

        Ok(())
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let s = self.stream.as_mut().ok_or(TransportError::NoCard)?;

        trace!("TX: {}", hex::encode(apdu));

        s.write_all(&(apdu.len() as u32).to_be_bytes()).await?;
        s.write_all(apdu).await?;

        let mut len = [0u8; 4];
        s.read_exact(&mut len).await?;

        let n = u32::from_be_bytes(len) as usize;
        if !(2..=MAX_FRAME_LEN).contains(&n) {
            return Err(TransportError::InvalidResponse);
        }

        let mut resp = vec![0u8; n];
        s.read_exact(&mut resp).await?;

        trace!("RX: {}", hex::encode(&resp));

        Ok(resp)
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Disconnected from {}", self.opts.socket_addr());
        }
    }
}

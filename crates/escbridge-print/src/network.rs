// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP transport (JetDirect, port 9100).
//
// The socket stays open for the life of the connection; every write is sent
// straight to the printer in 8 KiB chunks under the configured write timeout.

use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use tracing::{debug, info};

use crate::driver::Channel;

const CHUNK_SIZE: usize = 8192;

pub struct NetworkChannel {
    stream: Option<TcpStream>,
    addr: String,
}

impl NetworkChannel {
    pub fn open(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(BridgeError::Validation("network host is empty".into()));
        }
        let addr = format!("{host}:{port}");
        let candidates = (host, port).to_socket_addrs().map_err(|e| {
            BridgeError::connection(TransportKind::Network, format!("resolve {addr}: {e}"))
        })?;

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(timeout))
                        .map_err(|e| BridgeError::connection(TransportKind::Network, e))?;
                    let _ = stream.set_nodelay(true);
                    info!(addr = %addr, peer = %candidate, "connected to network printer");
                    return Ok(Self {
                        stream: Some(stream),
                        addr,
                    });
                }
                Err(e) => {
                    debug!(peer = %candidate, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let cause = match last_error {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                format!("connect to {addr} timed out after {}ms", timeout.as_millis())
            }
            Some(e) => format!("connect to {addr}: {e}"),
            None => format!("{addr} did not resolve to any address"),
        };
        Err(BridgeError::connection(TransportKind::Network, cause))
    }
}

impl Channel for NetworkChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::write(TransportKind::Network, "socket is closed"))?;

        let mut sent = 0;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.write_all(chunk).map_err(|e| {
                BridgeError::write(
                    TransportKind::Network,
                    format!("send to {} failed at byte {sent}: {e}", self.addr),
                )
            })?;
            sent += chunk.len();
        }
        debug!(addr = %self.addr, bytes = sent, "sent raw TCP data");
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream
                .flush()
                .map_err(|e| BridgeError::write(TransportKind::Network, e)),
            None => Ok(()),
        }
    }

    fn release(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }
}

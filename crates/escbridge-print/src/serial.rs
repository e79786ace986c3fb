// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RS-232 / COM port transport.

use std::io::Write;
use std::time::Duration;

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use serialport::SerialPort;
use tracing::debug;

use crate::driver::Channel;

pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialChannel {
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        if port.trim().is_empty() {
            return Err(BridgeError::Validation("serial port name is empty".into()));
        }
        let handle = serialport::new(port, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| BridgeError::connection(TransportKind::Serial, format!("{port}: {e}")))?;
        debug!(port, baud_rate, "opened serial printer");
        Ok(Self {
            port: Some(handle),
            name: port.to_string(),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| BridgeError::write(TransportKind::Serial, "port is closed"))
    }
}

impl Channel for SerialChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        let name = self.name.clone();
        self.port()?
            .write_all(bytes)
            .map_err(|e| BridgeError::write(TransportKind::Serial, format!("{name}: {e}")))
    }

    fn drain(&mut self) -> Result<()> {
        let name = self.name.clone();
        self.port()?
            .flush()
            .map_err(|e| BridgeError::write(TransportKind::Serial, format!("{name}: {e}")))
    }

    fn release(&mut self) -> Result<()> {
        // Dropping the handle closes the port.
        if let Some(mut port) = self.port.take() {
            port.flush()?;
        }
        Ok(())
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OS print spooler transport.
//
// Spoolers bill per document, so this channel buffers: everything written
// during one dispatch is submitted as a single RAW job on flush.

use std::sync::Arc;

use escbridge_bridge::PlatformBridge;
use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use tracing::info;

use crate::driver::Channel;

/// Document name shown in the OS print queue.
pub const JOB_NAME: &str = "escbridge receipt";

pub struct SpoolerChannel {
    printer_name: String,
    bridge: Arc<dyn PlatformBridge>,
}

impl SpoolerChannel {
    /// Bind to an installed queue. The queue must be known to the spooler.
    pub fn open(printer_name: &str, bridge: Arc<dyn PlatformBridge>) -> Result<Self> {
        if printer_name.trim().is_empty() {
            return Err(BridgeError::Validation("printer_name is empty".into()));
        }
        let installed = bridge.installed_printers()?;
        if !installed.iter().any(|p| p.name == printer_name) {
            return Err(BridgeError::connection(
                TransportKind::OsSpooler,
                format!(
                    "no printer named \"{printer_name}\" is installed ({})",
                    bridge.platform_name()
                ),
            ));
        }
        info!(printer = printer_name, backend = bridge.platform_name(), "bound to spooler queue");
        Ok(Self {
            printer_name: printer_name.to_string(),
            bridge,
        })
    }
}

impl Channel for SpoolerChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::OsSpooler
    }

    fn buffers_until_flush(&self) -> bool {
        true
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        self.bridge.submit_raw(&self.printer_name, JOB_NAME, bytes)
    }

    fn release(&mut self) -> Result<()> {
        // The queue handle is opened and closed per job.
        Ok(())
    }
}

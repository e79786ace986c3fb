// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for targets with no supported spooler.

use escbridge_core::error::{BridgeError, Result};

use crate::traits::*;

/// Bridge returned where neither CUPS nor the Win32 spooler exists.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "none (stub)"
    }
}

impl PrinterEnumerator for StubBridge {
    fn installed_printers(&self) -> Result<Vec<InstalledPrinter>> {
        tracing::warn!("PrinterEnumerator::installed_printers called on stub bridge");
        Err(BridgeError::PlatformUnavailable("printer enumeration".into()))
    }
}

impl SpoolerSubmit for StubBridge {
    fn submit_raw(&self, printer_name: &str, _document_name: &str, _data: &[u8]) -> Result<()> {
        tracing::warn!(printer = printer_name, "SpoolerSubmit::submit_raw called on stub bridge");
        Err(BridgeError::PlatformUnavailable("the OS print spooler".into()))
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic traits for the host print spooler.

use escbridge_core::error::Result;

/// Everything the print core needs from the host spooler.
pub trait PlatformBridge: PrinterEnumerator + SpoolerSubmit {
    /// Human-readable backend name (e.g. "CUPS", "Windows spooler").
    fn platform_name(&self) -> &str;
}

/// List printers registered with the operating system.
pub trait PrinterEnumerator: Send + Sync {
    /// Installed printers in the order the OS reports them.
    fn installed_printers(&self) -> Result<Vec<InstalledPrinter>>;
}

/// Submit a complete job to a named spooler queue.
pub trait SpoolerSubmit: Send + Sync {
    /// Submit `data` as one RAW (pass-through) job.
    ///
    /// Failures are reported as `BridgeError::Write` against the spooler
    /// transport, or `PlatformUnavailable` when there is no spooler at all.
    fn submit_raw(&self, printer_name: &str, document_name: &str, data: &[u8]) -> Result<()>;
}

/// One printer as reported by the host spooler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstalledPrinter {
    pub name: String,
    /// Port or device URI (`USB001`, `COM3`, `IP_10.0.0.5`, `usb://...`).
    pub port: Option<String>,
    pub driver: Option<String>,
    /// `None` when the backend does not report status.
    pub ready: Option<bool>,
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// escbridge: host print spooler bridges.
//
// The print core never talks to the operating system's spooler directly. It
// asks this crate for a `PlatformBridge` and uses it to enumerate installed
// printers and to submit RAW jobs to a named queue.

pub mod traits;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod win32;

pub mod stub;

use escbridge_core::config::BridgeConfig;

pub use traits::{InstalledPrinter, PlatformBridge, PrinterEnumerator, SpoolerSubmit};

/// Bridge implementation for the host operating system.
pub fn platform_bridge(config: &BridgeConfig) -> Box<dyn PlatformBridge> {
    #[cfg(windows)]
    {
        let _ = config;
        Box::new(win32::WindowsSpooler)
    }
    #[cfg(unix)]
    {
        Box::new(unix::CupsSpooler::default().with_timeout(config.spooler_timeout()))
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = config;
        Box::new(stub::StubBridge)
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Win32 spooler bridge.
//
// Enumeration uses EnumPrintersW level 2 (name, port, driver, status);
// submission opens the queue and writes one RAW document.

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use tracing::debug;

use crate::traits::*;

/// Bridge to the Windows print spooler.
pub struct WindowsSpooler;

impl PlatformBridge for WindowsSpooler {
    fn platform_name(&self) -> &str {
        "Windows spooler"
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Ports that belong to software printers (PDF, XPS, OneNote, fax).
fn is_virtual_port(port: &str) -> bool {
    let p = port.to_lowercase();
    p == "file:"
        || p == "portprompt:"
        || p == "xpsport:"
        || p == "nul:"
        || p.starts_with("onenote")
        || p.starts_with("wfsport:")
        || p.starts_with("shrfax:")
}

impl PrinterEnumerator for WindowsSpooler {
    fn installed_printers(&self) -> Result<Vec<InstalledPrinter>> {
        use windows::Win32::Graphics::Printing::{
            EnumPrintersW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_2W,
            PRINTER_STATUS_ERROR, PRINTER_STATUS_OFFLINE, PRINTER_STATUS_PAUSED,
        };
        use windows::core::PWSTR;

        let read = |p: PWSTR| -> Option<String> {
            if p.is_null() {
                None
            } else {
                // SAFETY: non-null strings inside the EnumPrintersW buffer are NUL-terminated.
                unsafe { p.to_string().ok() }
            }
        };

        // SAFETY: the buffer is sized by the first call and only read as
        // `returned` PRINTER_INFO_2W records while it is alive.
        unsafe {
            let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;

            let _ = EnumPrintersW(flags, None, 2, None, &mut needed, &mut returned);
            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                None,
                2,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|e| {
                BridgeError::connection(TransportKind::OsSpooler, format!("EnumPrintersW: {e}"))
            })?;

            let records =
                std::slice::from_raw_parts(buf.as_ptr() as *const PRINTER_INFO_2W, returned as usize);

            let unhealthy = PRINTER_STATUS_OFFLINE | PRINTER_STATUS_ERROR | PRINTER_STATUS_PAUSED;
            let printers: Vec<InstalledPrinter> = records
                .iter()
                .filter_map(|info| {
                    let name = read(info.pPrinterName)?;
                    let port = read(info.pPortName);
                    if port.as_deref().is_some_and(is_virtual_port) {
                        return None;
                    }
                    Some(InstalledPrinter {
                        name,
                        port,
                        driver: read(info.pDriverName),
                        ready: Some(info.Status & unhealthy == 0),
                    })
                })
                .collect();

            debug!(count = printers.len(), "enumerated Windows printers");
            Ok(printers)
        }
    }
}

impl SpoolerSubmit for WindowsSpooler {
    fn submit_raw(&self, printer_name: &str, document_name: &str, data: &[u8]) -> Result<()> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, OpenPrinterW,
            PRINTER_HANDLE, StartDocPrinterW, StartPagePrinter, WritePrinter,
        };
        use windows::core::{PCWSTR, PWSTR};

        let fail = |what: &str| {
            BridgeError::write(
                TransportKind::OsSpooler,
                format!("{what} failed for {printer_name}"),
            )
        };

        let name_w = to_wide(printer_name);
        let doc_name_w = to_wide(document_name);
        let datatype_w = to_wide("RAW");
        let len = u32::try_from(data.len())
            .map_err(|_| BridgeError::write(TransportKind::OsSpooler, "job larger than 4 GiB"))?;

        // SAFETY: every wide string outlives the calls that borrow it, and the
        // printer handle is closed on every path after a successful open.
        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None).map_err(|e| {
                BridgeError::connection(
                    TransportKind::OsSpooler,
                    format!("OpenPrinterW({printer_name}): {e}"),
                )
            })?;

            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(fail("StartDocPrinter"));
            }

            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(fail("StartPagePrinter"));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(handle, data.as_ptr() as *const c_void, len, &mut written);

            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);

            if !ok.as_bool() {
                return Err(fail("WritePrinter"));
            }
            if written != len {
                return Err(BridgeError::write(
                    TransportKind::OsSpooler,
                    format!("incomplete write to {printer_name}: {written} of {len} bytes"),
                ));
            }
        }

        debug!(printer = printer_name, bytes = data.len(), "submitted raw job to spooler");
        Ok(())
    }
}

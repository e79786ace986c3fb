// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory collaborators shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use escbridge_bridge::{InstalledPrinter, PlatformBridge, PrinterEnumerator, SpoolerSubmit};
use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{TransportConfig, TransportKind};
use escbridge_escpos::TextAttribute;

use crate::catalog::{PrinterCatalog, UsbPrinterDevice, UsbScanner};
use crate::driver::{Driver, DriverFactory};

// ---------------------------------------------------------------------------
// Spooler and USB fakes
// ---------------------------------------------------------------------------

pub struct FakeSpooler {
    printers: Vec<InstalledPrinter>,
    broken: bool,
}

impl FakeSpooler {
    pub fn with(printers: Vec<InstalledPrinter>) -> Self {
        Self {
            printers,
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            printers: Vec::new(),
            broken: true,
        }
    }
}

impl PlatformBridge for FakeSpooler {
    fn platform_name(&self) -> &str {
        "fake"
    }
}

impl PrinterEnumerator for FakeSpooler {
    fn installed_printers(&self) -> Result<Vec<InstalledPrinter>> {
        if self.broken {
            return Err(BridgeError::connection(TransportKind::OsSpooler, "lpstat crashed"));
        }
        Ok(self.printers.clone())
    }
}

impl SpoolerSubmit for FakeSpooler {
    fn submit_raw(&self, _printer_name: &str, _document_name: &str, _data: &[u8]) -> Result<()> {
        Ok(())
    }
}

pub struct FakeUsb(pub Vec<UsbPrinterDevice>);

impl UsbScanner for FakeUsb {
    fn printer_devices(&self) -> Result<Vec<UsbPrinterDevice>> {
        Ok(self.0.clone())
    }
}

pub struct BrokenUsb;

impl UsbScanner for BrokenUsb {
    fn printer_devices(&self) -> Result<Vec<UsbPrinterDevice>> {
        Err(BridgeError::connection(TransportKind::Usb, "libusb unavailable"))
    }
}

pub fn installed(name: &str, port: &str) -> InstalledPrinter {
    InstalledPrinter {
        name: name.into(),
        port: Some(port.into()),
        driver: Some("Generic / Text Only".into()),
        ready: Some(true),
    }
}

pub fn empty_catalog() -> PrinterCatalog {
    PrinterCatalog::new(Arc::new(FakeSpooler::with(Vec::new())), Arc::new(FakeUsb(Vec::new())))
}

// ---------------------------------------------------------------------------
// Recording driver
// ---------------------------------------------------------------------------

/// One observed driver call. Raw writes are recorded byte by byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Text(String),
    Byte(u8),
    Attribute(TextAttribute),
    Cut,
    Flush,
    Close,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub struct RecordingDriver {
    kind: TransportKind,
    log: CallLog,
    byte_delay: Option<Duration>,
    fail_flush: bool,
    /// Zero-based index of the one write call that fails.
    fail_write_at: Option<usize>,
    writes: usize,
}

impl Driver for RecordingDriver {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn buffers_until_flush(&self) -> bool {
        false
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.count_write()?;
        self.record(Call::Text(text.to_string()));
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.count_write()?;
        for &b in bytes {
            self.record(Call::Byte(b));
            if let Some(delay) = self.byte_delay {
                std::thread::sleep(delay);
            }
        }
        Ok(())
    }

    fn set_attribute(&mut self, attribute: TextAttribute) -> Result<()> {
        self.count_write()?;
        self.record(Call::Attribute(attribute));
        Ok(())
    }

    fn cut(&mut self) -> Result<()> {
        self.count_write()?;
        self.record(Call::Cut);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.record(Call::Flush);
        if self.fail_flush {
            return Err(BridgeError::write(self.kind, "paper out"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.record(Call::Close);
    }
}

impl RecordingDriver {
    fn record(&self, call: Call) {
        self.log.lock().expect("call log").push(call);
    }

    fn count_write(&mut self) -> Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            return Err(BridgeError::write(self.kind, "device went offline"));
        }
        Ok(())
    }
}

/// Factory handing out recording drivers, keyed by `TransportConfig::target()`.
#[derive(Default)]
pub struct RecordingFactory {
    logs: Mutex<HashMap<String, CallLog>>,
    unreachable: Mutex<HashSet<String>>,
    slow: Mutex<HashMap<String, Duration>>,
    failing_flush: Mutex<HashSet<String>>,
    failing_write: Mutex<HashMap<String, usize>>,
    opens: Mutex<usize>,
    open_delay: Mutex<Option<Duration>>,
}

impl RecordingFactory {
    pub fn unreachable(&self, target: &str) {
        self.unreachable.lock().expect("lock").insert(target.into());
    }

    pub fn slow(&self, target: &str, per_byte: Duration) {
        self.slow.lock().expect("lock").insert(target.into(), per_byte);
    }

    pub fn failing_flush(&self, target: &str) {
        self.failing_flush.lock().expect("lock").insert(target.into());
    }

    /// Let `successful` write calls through, then fail the next one once.
    pub fn failing_write_after(&self, target: &str, successful: usize) {
        self.failing_write
            .lock()
            .expect("lock")
            .insert(target.into(), successful);
    }

    pub fn delay_open(&self, delay: Duration) {
        *self.open_delay.lock().expect("lock") = Some(delay);
    }

    /// Calls seen by every driver opened on `target`, in order.
    pub fn calls(&self, target: &str) -> Vec<Call> {
        self.logs
            .lock()
            .expect("lock")
            .get(target)
            .map(|log| log.lock().expect("call log").clone())
            .unwrap_or_default()
    }

    pub fn opens(&self) -> usize {
        *self.opens.lock().expect("lock")
    }
}

impl DriverFactory for RecordingFactory {
    fn open(&self, config: &TransportConfig) -> Result<Box<dyn Driver>> {
        let delay = *self.open_delay.lock().expect("lock");
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let target = config.target();
        if self.unreachable.lock().expect("lock").contains(&target) {
            return Err(BridgeError::connection(config.kind(), format!("{target}: connection refused")));
        }
        *self.opens.lock().expect("lock") += 1;
        let log = Arc::clone(
            self.logs
                .lock()
                .expect("lock")
                .entry(target.clone())
                .or_default(),
        );
        Ok(Box::new(RecordingDriver {
            kind: config.kind(),
            log,
            byte_delay: self.slow.lock().expect("lock").get(&target).copied(),
            fail_flush: self.failing_flush.lock().expect("lock").contains(&target),
            fail_write_at: self.failing_write.lock().expect("lock").get(&target).copied(),
            writes: 0,
        }))
    }
}

/// Network config whose `target()` is `network <host>:9100`.
pub fn network(host: &str) -> TransportConfig {
    TransportConfig::Network(escbridge_core::types::NetworkConfig {
        host: host.into(),
        port: Some(9100),
    })
}

pub fn target(host: &str) -> String {
    format!("network {host}:9100")
}

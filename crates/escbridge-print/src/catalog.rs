// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer catalog: what can be connected to right now.
//
// Every query enumerates afresh; nothing is cached between calls. Backend
// failures never reach the caller: they degrade to an empty list and a note
// in the listing, and are logged at warn level.

use std::sync::Arc;

use escbridge_bridge::{InstalledPrinter, PlatformBridge};
use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{
    CatalogEntry, CatalogOrigin, CatalogReference, FileConfig, NetworkConfig, Readiness,
    SerialConfig, SpoolerConfig, TransportConfig, TransportKind, UsbConfig,
    DEFAULT_USB_IN_ENDPOINT, DEFAULT_USB_OUT_ENDPOINT,
};
use rusb::UsbContext;
use serde::Serialize;
use tracing::{debug, warn};

/// USB interface class code for printers.
pub const USB_CLASS_PRINTER: u8 = 7;

/// A printer-class device seen on the USB bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPrinterDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Whether the device could be opened to read its strings.
    pub accessible: bool,
}

impl UsbPrinterDevice {
    pub fn display_name(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{m} {p}"),
            (None, Some(p)) => p.clone(),
            (Some(m), None) => format!("{m} {:04x}:{:04x}", self.vendor_id, self.product_id),
            (None, None) => format!("USB printer {:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// Source of printer-class USB devices.
pub trait UsbScanner: Send + Sync {
    fn printer_devices(&self) -> Result<Vec<UsbPrinterDevice>>;
}

/// Scans the bus through libusb.
pub struct LibusbScanner;

impl UsbScanner for LibusbScanner {
    fn printer_devices(&self) -> Result<Vec<UsbPrinterDevice>> {
        let scan_error = |e: rusb::Error| BridgeError::connection(TransportKind::Usb, e);
        let context = rusb::Context::new().map_err(scan_error)?;
        let devices = context.devices().map_err(scan_error)?;

        let mut found = Vec::new();
        for device in devices.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            let is_printer = descriptor.class_code() == USB_CLASS_PRINTER
                || device.active_config_descriptor().is_ok_and(|config| {
                    config.interfaces().any(|interface| {
                        interface
                            .descriptors()
                            .any(|alt| alt.class_code() == USB_CLASS_PRINTER)
                    })
                });
            if !is_printer {
                continue;
            }

            let (manufacturer, product, accessible) = match device.open() {
                Ok(handle) => (
                    handle.read_manufacturer_string_ascii(&descriptor).ok(),
                    handle.read_product_string_ascii(&descriptor).ok(),
                    true,
                ),
                Err(e) => {
                    debug!(
                        vendor_id = descriptor.vendor_id(),
                        product_id = descriptor.product_id(),
                        error = %e,
                        "cannot open USB printer to read its name"
                    );
                    (None, None, false)
                }
            };

            found.push(UsbPrinterDevice {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                manufacturer,
                product,
                accessible,
            });
        }
        Ok(found)
    }
}

/// Result of one catalog query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogListing {
    pub entries: Vec<CatalogEntry>,
    /// Diagnostics from backends that failed during this query.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl CatalogListing {
    fn degraded(note: String) -> Self {
        Self {
            entries: Vec::new(),
            notes: vec![note],
        }
    }
}

pub struct PrinterCatalog {
    spooler: Arc<dyn PlatformBridge>,
    usb: Arc<dyn UsbScanner>,
}

impl PrinterCatalog {
    pub fn new(spooler: Arc<dyn PlatformBridge>, usb: Arc<dyn UsbScanner>) -> Self {
        Self { spooler, usb }
    }

    /// Catalog over the host spooler and the libusb bus scan.
    pub fn system(spooler: Arc<dyn PlatformBridge>) -> Self {
        Self::new(spooler, Arc::new(LibusbScanner))
    }

    pub fn list_os_printers(&self) -> CatalogListing {
        match self.spooler.installed_printers() {
            Ok(printers) => CatalogListing {
                entries: printers
                    .into_iter()
                    .enumerate()
                    .map(|(index, printer)| os_entry(index, printer))
                    .collect(),
                notes: Vec::new(),
            },
            Err(e) => {
                warn!(backend = self.spooler.platform_name(), error = %e, "OS printer enumeration failed");
                CatalogListing::degraded(format!(
                    "{} printer enumeration failed: {e}",
                    self.spooler.platform_name()
                ))
            }
        }
    }

    pub fn list_usb_printers(&self) -> CatalogListing {
        match self.usb.printer_devices() {
            Ok(devices) => CatalogListing {
                entries: devices
                    .into_iter()
                    .enumerate()
                    .map(|(index, device)| usb_entry(index, device))
                    .collect(),
                notes: Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, "USB printer scan failed");
                CatalogListing::degraded(format!("USB printer scan failed: {e}"))
            }
        }
    }

    /// OS printers first, then USB devices, indexed from 0.
    pub fn list_all(&self) -> CatalogListing {
        let os = self.list_os_printers();
        let usb = self.list_usb_printers();

        let mut entries: Vec<CatalogEntry> = os.entries.into_iter().chain(usb.entries).collect();
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.index = index;
        }
        let notes = os.notes.into_iter().chain(usb.notes).collect();

        debug!(count = entries.len(), "catalog query complete");
        CatalogListing { entries, notes }
    }

    /// Re-query and pick one entry by exact index or exact, case-sensitive name.
    pub fn resolve(&self, reference: &CatalogReference) -> Result<CatalogEntry> {
        let listing = self.list_all();
        let found = match reference {
            CatalogReference::Index(index) => {
                listing.entries.into_iter().find(|e| e.index == *index)
            }
            CatalogReference::Name(name) => listing.entries.into_iter().find(|e| &e.name == name),
        };
        found.ok_or_else(|| BridgeError::PrinterNotFound(reference.to_string()))
    }
}

fn os_entry(index: usize, printer: InstalledPrinter) -> CatalogEntry {
    let mut entry = CatalogEntry {
        index,
        name: printer.name,
        port: printer.port,
        driver: printer.driver,
        kind: None,
        readiness: match printer.ready {
            Some(true) => Readiness::Ready,
            Some(false) => Readiness::Error,
            None => Readiness::Unknown,
        },
        origin: CatalogOrigin::OsInstalled,
        vendor_id: None,
        product_id: None,
    };
    // Labelled with the transport a connect by reference will open.
    entry.kind = infer_connection(&entry).ok().map(|config| config.kind());
    entry
}

fn usb_entry(index: usize, device: UsbPrinterDevice) -> CatalogEntry {
    CatalogEntry {
        index,
        name: device.display_name(),
        port: None,
        driver: device.manufacturer.clone(),
        kind: Some(TransportKind::Usb),
        readiness: if device.accessible {
            Readiness::Ready
        } else {
            Readiness::Unknown
        },
        origin: CatalogOrigin::UsbDirect,
        vendor_id: Some(device.vendor_id),
        product_id: Some(device.product_id),
    }
}

/// Connection configuration implied by a catalog entry.
///
/// USB-direct entries open the device itself. OS entries go through the
/// spooler unless the port names something the bridge can drive directly:
/// `COMn` (serial), `LPTn` (file), `IP_host` / `socket://host:port` /
/// `host:port` (raw network).
pub fn infer_connection(entry: &CatalogEntry) -> Result<TransportConfig> {
    if entry.origin == CatalogOrigin::UsbDirect {
        let (Some(vendor_id), Some(product_id)) = (entry.vendor_id, entry.product_id) else {
            return Err(BridgeError::Validation(format!(
                "USB catalog entry \"{}\" has no vendor/product id",
                entry.name
            )));
        };
        return Ok(TransportConfig::Usb(UsbConfig {
            vendor_id,
            product_id,
            in_endpoint: DEFAULT_USB_IN_ENDPOINT,
            out_endpoint: DEFAULT_USB_OUT_ENDPOINT,
        }));
    }

    let spooler = || {
        TransportConfig::OsSpooler(SpoolerConfig {
            printer_name: entry.name.clone(),
        })
    };

    let Some(port) = entry.port.as_deref().map(str::trim) else {
        return Ok(spooler());
    };
    let upper = port.to_ascii_uppercase();

    if is_device_port(&upper, "COM") {
        return Ok(TransportConfig::Serial(SerialConfig {
            port: port.trim_end_matches(':').to_string(),
            baud_rate: None,
        }));
    }
    if is_device_port(&upper, "LPT") {
        return Ok(TransportConfig::File(FileConfig {
            path: port.trim_end_matches(':').to_string(),
        }));
    }
    if upper.starts_with("IP_") {
        // Windows standard TCP/IP ports: `IP_10.0.0.5` or `IP_10.0.0.5,1`.
        let host = port[3..].split(',').next().unwrap_or_default();
        return Ok(TransportConfig::Network(NetworkConfig {
            host: host.to_string(),
            port: None,
        }));
    }
    if let Some(rest) = port.strip_prefix("socket://") {
        if let Some(network) = host_port(rest.trim_end_matches('/')) {
            return Ok(TransportConfig::Network(network));
        }
        return Ok(TransportConfig::Network(NetworkConfig {
            host: rest.trim_end_matches('/').to_string(),
            port: None,
        }));
    }
    if !port.contains("://") && !port.starts_with(r"\\") {
        if let Some(network) = host_port(port) {
            return Ok(TransportConfig::Network(network));
        }
    }
    Ok(spooler())
}

/// `COM3`, `COM3:`, `LPT1` but not `COMPANY-PRINTER`.
fn is_device_port(upper: &str, prefix: &str) -> bool {
    upper
        .strip_prefix(prefix)
        .map(|rest| rest.trim_end_matches(':'))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn host_port(text: &str) -> Option<NetworkConfig> {
    let (host, port) = text.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some(NetworkConfig {
        host: host.to_string(),
        port: Some(port),
    })
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Direct USB transport via libusb bulk transfers.

use std::time::Duration;

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{TransportKind, UsbConfig};
use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, warn};

use crate::driver::Channel;

/// Interface claimed on the printer. ESC/POS printers expose exactly one.
const PRINTER_INTERFACE: u8 = 0;

fn connection_error(cause: impl std::fmt::Display) -> BridgeError {
    BridgeError::connection(TransportKind::Usb, cause)
}

/// Interface ownership calls on an open device.
trait InterfaceControl {
    fn claim(&mut self, interface: u8) -> rusb::Result<()>;
    fn release(&mut self, interface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
}

impl<T: UsbContext> InterfaceControl for DeviceHandle<T> {
    fn claim(&mut self, interface: u8) -> rusb::Result<()> {
        self.claim_interface(interface)
    }

    fn release(&mut self, interface: u8) -> rusb::Result<()> {
        self.release_interface(interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, interface)
    }
}

fn reattach(handle: &mut impl InterfaceControl) {
    if let Err(e) = handle.attach_kernel_driver(PRINTER_INTERFACE) {
        warn!(error = %e, "could not hand the USB printer back to the kernel driver");
    }
}

/// Claim the printer interface. A failed claim hands a detached interface
/// back to the kernel driver before returning.
fn claim(handle: &mut impl InterfaceControl, detached: bool) -> Result<()> {
    match handle.claim(PRINTER_INTERFACE) {
        Ok(()) => Ok(()),
        Err(e) => {
            if detached {
                reattach(handle);
            }
            Err(connection_error(format!("claim interface: {e}")))
        }
    }
}

/// Release the interface, then reattach the kernel driver even if the
/// release failed.
fn release(handle: &mut impl InterfaceControl, detached: bool) -> Result<()> {
    let released = handle.release(PRINTER_INTERFACE);
    if detached {
        reattach(handle);
    }
    released.map_err(connection_error)
}

/// Claimed printer interface with a bulk OUT endpoint.
pub struct UsbChannel {
    handle: DeviceHandle<Context>,
    out_endpoint: u8,
    timeout: Duration,
    reattach_kernel_driver: bool,
    claimed: bool,
}

impl UsbChannel {
    pub fn open(config: &UsbConfig, timeout: Duration) -> Result<Self> {
        let context = Context::new().map_err(connection_error)?;

        let devices = context.devices().map_err(connection_error)?;
        let device = devices
            .iter()
            .find(|device| {
                device.device_descriptor().is_ok_and(|d| {
                    d.vendor_id() == config.vendor_id && d.product_id() == config.product_id
                })
            })
            .ok_or_else(|| {
                connection_error(format!(
                    "no USB device {:04x}:{:04x} found",
                    config.vendor_id, config.product_id
                ))
            })?;

        let mut handle = device.open().map_err(connection_error)?;

        let mut reattach_kernel_driver = false;
        match handle.kernel_driver_active(PRINTER_INTERFACE) {
            Ok(true) => {
                handle
                    .detach_kernel_driver(PRINTER_INTERFACE)
                    .map_err(connection_error)?;
                reattach_kernel_driver = true;
            }
            Ok(false) => {}
            Err(e) => {
                // Not supported on every platform (e.g. Windows, macOS).
                debug!(error = %e, "could not query USB kernel driver state");
            }
        }

        claim(&mut handle, reattach_kernel_driver)?;

        debug!(
            vendor_id = config.vendor_id,
            product_id = config.product_id,
            out_endpoint = config.out_endpoint,
            "claimed USB printer interface"
        );

        Ok(Self {
            handle,
            out_endpoint: config.out_endpoint,
            timeout,
            reattach_kernel_driver,
            claimed: true,
        })
    }
}

impl Channel for UsbChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < bytes.len() {
            let written = self
                .handle
                .write_bulk(self.out_endpoint, &bytes[offset..], self.timeout)
                .map_err(|e| BridgeError::write(TransportKind::Usb, e))?;
            if written == 0 {
                return Err(BridgeError::write(
                    TransportKind::Usb,
                    format!("device accepted 0 of {} bytes", bytes.len() - offset),
                ));
            }
            offset += written;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.claimed {
            return Ok(());
        }
        self.claimed = false;
        release(&mut self.handle, self.reattach_kernel_driver)
    }
}

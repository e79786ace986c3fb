// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection drivers: one uniform write surface over every transport.
//
// A `PrinterDriver` wraps a byte `Channel`. Streaming channels (USB, serial,
// network, file) transmit every write immediately; buffering channels (the
// OS spooler) accumulate the job and submit it as one document on `flush`.
// The interpreter never needs to know which kind it is talking to.

use std::sync::Arc;
use std::time::Duration;

use escbridge_bridge::PlatformBridge;
use escbridge_core::config::BridgeConfig;
use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{TransportConfig, TransportKind};
use escbridge_escpos::{Encoder, TextAttribute};
use tracing::{debug, info, warn};

use crate::file_port::FileChannel;
use crate::network::NetworkChannel;
use crate::serial::SerialChannel;
use crate::spooler::SpoolerChannel;
use crate::usb::UsbChannel;

/// Capability surface shared by every connection, whatever its transport.
pub trait Driver: Send {
    fn kind(&self) -> TransportKind;

    /// `true` when writes accumulate until `flush` submits them as one job.
    fn buffers_until_flush(&self) -> bool;

    fn write_text(&mut self, text: &str) -> Result<()>;

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    fn set_attribute(&mut self, attribute: TextAttribute) -> Result<()>;

    fn cut(&mut self) -> Result<()>;

    /// Submit the buffered job (buffering transports) or push any bytes the
    /// OS still holds (streaming transports).
    fn flush(&mut self) -> Result<()>;

    /// Release the transport. Idempotent and never fails; problems are logged.
    fn close(&mut self);
}

/// Raw byte pipe to one physical or logical target.
pub trait Channel: Send {
    fn kind(&self) -> TransportKind;

    fn buffers_until_flush(&self) -> bool {
        false
    }

    /// Deliver bytes to the target. For buffering channels this is the whole job.
    fn transmit(&mut self, bytes: &[u8]) -> Result<()>;

    /// Push OS-level buffers out to the device.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Give the underlying resource back to the OS.
    fn release(&mut self) -> Result<()>;
}

/// The driver used for every real transport.
pub struct PrinterDriver {
    channel: Box<dyn Channel>,
    encoder: Encoder,
    buffer: Vec<u8>,
    closed: bool,
}

impl PrinterDriver {
    pub fn new(channel: Box<dyn Channel>, encoder: Encoder) -> Self {
        Self {
            channel,
            encoder,
            buffer: Vec::new(),
            closed: false,
        }
    }

    /// Bytes waiting for the next `flush` (always 0 for streaming channels).
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(BridgeError::write(self.channel.kind(), "connection is closed"));
        }
        if self.channel.buffers_until_flush() {
            self.buffer.extend_from_slice(bytes);
            Ok(())
        } else {
            self.channel.transmit(bytes)
        }
    }
}

impl Driver for PrinterDriver {
    fn kind(&self) -> TransportKind {
        self.channel.kind()
    }

    fn buffers_until_flush(&self) -> bool {
        self.channel.buffers_until_flush()
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let bytes = self.encoder.text(text)?;
        self.emit(&bytes)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.emit(bytes)
    }

    fn set_attribute(&mut self, attribute: TextAttribute) -> Result<()> {
        let bytes = self.encoder.attribute(attribute)?;
        self.emit(&bytes)
    }

    fn cut(&mut self) -> Result<()> {
        let bytes = self.encoder.cut()?;
        self.emit(&bytes)
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(BridgeError::write(self.channel.kind(), "connection is closed"));
        }
        if !self.channel.buffers_until_flush() {
            return self.channel.drain();
        }
        if self.buffer.is_empty() {
            return Ok(());
        }
        // Consumed even when the submission fails.
        let job = std::mem::take(&mut self.buffer);
        debug!(transport = %self.channel.kind(), bytes = job.len(), "submitting buffered job");
        self.channel.transmit(&job)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.buffer.is_empty() {
            warn!(
                transport = %self.channel.kind(),
                bytes = self.buffer.len(),
                "discarding unflushed bytes on close"
            );
            self.buffer.clear();
        }
        if let Err(e) = self.channel.release() {
            warn!(transport = %self.channel.kind(), error = %e, "error while closing printer");
        }
    }
}

impl Drop for PrinterDriver {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Opening drivers
// ---------------------------------------------------------------------------

/// Transport-level timeouts so no open or write can hang the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub network: Duration,
    pub usb: Duration,
    pub serial: Duration,
}

impl DriverTimeouts {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            network: config.network_timeout(),
            usb: config.usb_timeout(),
            serial: config.serial_timeout(),
        }
    }
}

/// Turns a transport configuration into an open driver.
pub trait DriverFactory: Send + Sync {
    /// Open the transport. Fails with `BridgeError::Connection` (or
    /// `Validation` for unusable fields); never leaves resources held on error.
    fn open(&self, config: &TransportConfig) -> Result<Box<dyn Driver>>;
}

/// Factory for real hardware.
pub struct SystemDrivers {
    timeouts: DriverTimeouts,
    encoder: Encoder,
    default_baud_rate: u32,
    default_network_port: u16,
    spooler: Arc<dyn PlatformBridge>,
}

impl SystemDrivers {
    pub fn new(config: &BridgeConfig, spooler: Arc<dyn PlatformBridge>) -> Self {
        Self {
            timeouts: DriverTimeouts::from_config(config),
            encoder: Encoder::new(config.code_page),
            default_baud_rate: config.default_baud_rate,
            default_network_port: config.default_network_port,
            spooler,
        }
    }
}

impl DriverFactory for SystemDrivers {
    fn open(&self, config: &TransportConfig) -> Result<Box<dyn Driver>> {
        let channel: Box<dyn Channel> = match config {
            TransportConfig::Usb(usb) => Box::new(UsbChannel::open(usb, self.timeouts.usb)?),
            TransportConfig::Serial(serial) => Box::new(SerialChannel::open(
                &serial.port,
                serial.baud_rate.unwrap_or(self.default_baud_rate),
                self.timeouts.serial,
            )?),
            TransportConfig::Network(net) => Box::new(NetworkChannel::open(
                &net.host,
                net.port.unwrap_or(self.default_network_port),
                self.timeouts.network,
            )?),
            TransportConfig::File(file) => Box::new(FileChannel::open(&file.path)?),
            TransportConfig::OsSpooler(spool) => Box::new(SpoolerChannel::open(
                &spool.printer_name,
                Arc::clone(&self.spooler),
            )?),
        };
        info!(
            endpoint = %config.target(),
            code_page = %self.encoder.code_page(),
            "opened printer transport"
        );
        Ok(Box::new(PrinterDriver::new(channel, self.encoder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escbridge_escpos::{CUT_FEED_LINES, CodePage};
    use std::sync::Mutex;

    /// In-memory channel that records every transmission.
    struct MemoryChannel {
        buffering: bool,
        fail_transmit: bool,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        releases: Arc<Mutex<usize>>,
    }

    impl MemoryChannel {
        fn new(buffering: bool) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>, Arc<Mutex<usize>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let releases = Arc::new(Mutex::new(0));
            (
                Self {
                    buffering,
                    fail_transmit: false,
                    sent: Arc::clone(&sent),
                    releases: Arc::clone(&releases),
                },
                sent,
                releases,
            )
        }
    }

    impl Channel for MemoryChannel {
        fn kind(&self) -> TransportKind {
            if self.buffering {
                TransportKind::OsSpooler
            } else {
                TransportKind::Network
            }
        }

        fn buffers_until_flush(&self) -> bool {
            self.buffering
        }

        fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
            if self.fail_transmit {
                return Err(BridgeError::write(self.kind(), "device offline"));
            }
            self.sent.lock().expect("lock").push(bytes.to_vec());
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            *self.releases.lock().expect("lock") += 1;
            Err(BridgeError::connection(self.kind(), "already unplugged"))
        }
    }

    #[test]
    fn streaming_driver_writes_immediately() {
        let (channel, sent, _) = MemoryChannel::new(false);
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::default());

        driver.write_raw(&[0x1B, 0x40]).expect("write");
        driver.write_text("Hi").expect("write");
        let sent = sent.lock().expect("lock").clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], vec![0x1B, 0x40]);
        assert!(sent[1].ends_with(b"Hi"));
        assert_eq!(driver.pending(), 0);
        driver.flush().expect("flush");
    }

    #[test]
    fn buffering_driver_submits_one_job_on_flush() {
        let (channel, sent, _) = MemoryChannel::new(true);
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::default());

        driver
            .set_attribute(TextAttribute::parse("align", "center").expect("attr"))
            .expect("attr");
        driver.write_text("Hi").expect("text");
        driver.cut().expect("cut");
        assert!(sent.lock().expect("lock").is_empty());

        driver.flush().expect("flush");
        let jobs = sent.lock().expect("lock").clone();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert!(job.starts_with(&[0x1B, 0x61, 0x01]));
        let text_end = job
            .windows(2)
            .position(|w| w == b"Hi")
            .expect("text in job")
            + 2;
        assert_eq!(&job[text_end..text_end + 3], &[0x1B, 0x64, CUT_FEED_LINES]);

        // An empty buffer submits nothing.
        driver.flush().expect("flush");
        assert_eq!(sent.lock().expect("lock").len(), 1);
    }

    #[test]
    fn text_goes_out_in_the_configured_code_page() {
        let (channel, sent, _) = MemoryChannel::new(false);
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::new(CodePage::Cp437));

        driver.write_text("Café £5").expect("write");
        let sent = sent.lock().expect("lock").clone();
        assert!(sent[0].ends_with(&[0x43, 0x61, 0x66, 0x82, 0x20, 0x9C, 0x35]));
    }

    #[test]
    fn failed_flush_still_clears_the_buffer() {
        let (mut channel, _, _) = MemoryChannel::new(true);
        channel.fail_transmit = true;
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::default());

        driver.write_text("lost").expect("buffer");
        let err = driver.flush().expect_err("offline");
        assert!(matches!(err, BridgeError::Write { .. }));
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn close_is_idempotent_and_swallows_errors() {
        let (channel, _, releases) = MemoryChannel::new(false);
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::default());

        driver.close();
        driver.close();
        drop(driver);
        assert_eq!(*releases.lock().expect("lock"), 1);
    }

    #[test]
    fn writes_after_close_are_rejected() {
        let (channel, sent, _) = MemoryChannel::new(false);
        let mut driver = PrinterDriver::new(Box::new(channel), Encoder::default());
        driver.close();

        let err = driver.write_raw(&[0x0A]).expect_err("closed");
        assert!(matches!(err, BridgeError::Write { .. }));
        assert!(sent.lock().expect("lock").is_empty());
    }
}

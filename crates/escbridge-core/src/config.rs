// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;
use std::time::Duration;

use escbridge_escpos::CodePage;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "ESCBRIDGE_CONFIG";

/// Environment override for the listener port.
pub const PORT_ENV: &str = "ESCBRIDGE_PORT";

/// Environment override for the listener address.
pub const BIND_ENV: &str = "ESCBRIDGE_BIND";

/// Persistent bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the HTTP listener binds to. Local-only by default.
    pub bind_address: String,
    /// Port for the HTTP listener (default 8888).
    pub port: u16,
    /// TCP connect and write timeout for network printers.
    pub network_timeout_ms: u64,
    /// Bulk transfer timeout for USB printers.
    pub usb_timeout_ms: u64,
    /// Write timeout for serial printers.
    pub serial_timeout_ms: u64,
    /// Longest a spooler tool (`lp`, `lpstat`) may run before it is killed.
    pub spooler_timeout_ms: u64,
    /// Baud rate used when a serial configuration omits one.
    pub default_baud_rate: u32,
    /// Raw printing port used when a network configuration omits one.
    pub default_network_port: u16,
    /// Largest accepted HTTP request body.
    pub max_request_bytes: usize,
    /// Code page printed text is transcoded to.
    pub code_page: CodePage,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 8888,
            network_timeout_ms: 5_000,
            usb_timeout_ms: 5_000,
            serial_timeout_ms: 1_000,
            spooler_timeout_ms: 30_000,
            default_baud_rate: 9600,
            default_network_port: 9100,
            max_request_bytes: 4 * 1024 * 1024,
            code_page: CodePage::Cp437,
        }
    }
}

impl BridgeConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Load from `ESCBRIDGE_CONFIG` (if set), then apply port/bind overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Ok(port) = std::env::var(PORT_ENV) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| BridgeError::Validation(format!("{PORT_ENV}={port} is not a port")))?;
        }
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_address = bind;
        }
        Ok(config)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn usb_timeout(&self) -> Duration {
        Duration::from_millis(self.usb_timeout_ms)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn spooler_timeout(&self) -> Duration {
        Duration::from_millis(self.spooler_timeout_ms)
    }

    /// `address:port` string for the listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

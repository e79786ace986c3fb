// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File / device-node / parallel-port transport.
//
// Covers `/dev/usb/lp0`, `LPT1`, `\\.\COM3`-style names and plain files used
// to capture output. The target is opened for appending and never truncated.

use std::fs::{File, OpenOptions};
use std::io::Write;

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use tracing::debug;

use crate::driver::Channel;

pub struct FileChannel {
    file: Option<File>,
    path: String,
}

impl FileChannel {
    pub fn open(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(BridgeError::Validation("file path is empty".into()));
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| BridgeError::connection(TransportKind::File, format!("{path}: {e}")))?;
        debug!(path, "opened file printer");
        Ok(Self {
            file: Some(file),
            path: path.to_string(),
        })
    }
}

impl Channel for FileChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::File
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| BridgeError::write(TransportKind::File, "file is closed"))?;
        file.write_all(bytes)
            .map_err(|e| BridgeError::write(TransportKind::File, format!("{}: {e}", self.path)))
    }

    fn drain(&mut self) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => file
                .flush()
                .map_err(|e| BridgeError::write(TransportKind::File, e)),
            None => Ok(()),
        }
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

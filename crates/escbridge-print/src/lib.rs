// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// escbridge Print: connection drivers for every transport, the printer
// catalog, the connection registry, the command interpreter, and the async
// request façade the HTTP listener calls into.

pub mod catalog;
pub mod driver;
pub mod facade;
pub mod file_port;
pub mod interpreter;
pub mod network;
pub mod registry;
pub mod serial;
pub mod spooler;
pub mod usb;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{PrinterCatalog, infer_connection};
pub use driver::{Driver, DriverFactory, SystemDrivers};
pub use facade::PrintBridge;
pub use registry::ConnectionRegistry;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS vocabulary for the bridge.  Attribute names and values are
// validated here; the bytes themselves come from the `escpos` crate.  This
// crate knows nothing about connections, handles, or how the bytes reach the
// device.

pub mod attribute;
pub mod code_page;
pub mod encoder;

pub use attribute::{Alignment, AttributeError, Font, TextAttribute, TextSize};
pub use code_page::CodePage;
pub use encoder::{CUT_FEED_LINES, EncodeError, Encoder};

/// Command library reported by the bridge health check.
pub const LIBRARY_NAME: &str = "escpos";

/// Version requirement of the command library this build links.
pub const LIBRARY_VERSION: &str = "0.15";

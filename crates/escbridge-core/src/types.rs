// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the escbridge printer bridge.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Caller-visible identifier of one live printer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterHandle(pub String);

impl PrinterHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrinterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrinterHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrinterHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Physical or logical channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Serial,
    Network,
    File,
    /// Printer registered with the host spooler (Windows print queue, CUPS).
    #[serde(rename = "os-spooler", alias = "os_spooler", alias = "windows", alias = "spooler")]
    OsSpooler,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Serial => "serial",
            Self::Network => "network",
            Self::File => "file",
            Self::OsSpooler => "os-spooler",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transport configuration
// ---------------------------------------------------------------------------

/// Default bulk IN endpoint of most ESC/POS USB printers.
pub const DEFAULT_USB_IN_ENDPOINT: u8 = 0x81;

/// Default bulk OUT endpoint of most ESC/POS USB printers.
pub const DEFAULT_USB_OUT_ENDPOINT: u8 = 0x03;

/// Direct USB connection by vendor/product identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbConfig {
    #[serde(deserialize_with = "flexible_int")]
    pub vendor_id: u16,
    #[serde(deserialize_with = "flexible_int")]
    pub product_id: u16,
    #[serde(
        default = "default_in_endpoint",
        alias = "in_ep",
        deserialize_with = "flexible_int"
    )]
    pub in_endpoint: u8,
    #[serde(
        default = "default_out_endpoint",
        alias = "out_ep",
        deserialize_with = "flexible_int"
    )]
    pub out_endpoint: u8,
}

fn default_in_endpoint() -> u8 {
    DEFAULT_USB_IN_ENDPOINT
}

fn default_out_endpoint() -> u8 {
    DEFAULT_USB_OUT_ENDPOINT
}

/// Serial / COM port connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    /// Falls back to the configured default baud rate when absent.
    #[serde(default, alias = "baudrate")]
    pub baud_rate: Option<u32>,
}

/// Raw TCP socket connection (JetDirect style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Device node, file, or parallel port written as a byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(alias = "file")]
    pub path: String,
}

/// Printer registered with the operating system's spooler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolerConfig {
    #[serde(alias = "name")]
    pub printer_name: String,
}

/// Hardware configuration of one connection; the variant is the transport tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum TransportConfig {
    Usb(UsbConfig),
    Serial(SerialConfig),
    Network(NetworkConfig),
    File(FileConfig),
    #[serde(rename = "os-spooler")]
    OsSpooler(SpoolerConfig),
}

impl TransportConfig {
    /// Build a typed configuration from a transport tag and its loose JSON fields.
    pub fn from_value(kind: TransportKind, value: serde_json::Value) -> Result<Self> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        let invalid = |e: serde_json::Error| {
            BridgeError::Validation(format!("invalid {kind} config: {e}"))
        };
        Ok(match kind {
            TransportKind::Usb => Self::Usb(serde_json::from_value(value).map_err(invalid)?),
            TransportKind::Serial => Self::Serial(serde_json::from_value(value).map_err(invalid)?),
            TransportKind::Network => {
                Self::Network(serde_json::from_value(value).map_err(invalid)?)
            }
            TransportKind::File => Self::File(serde_json::from_value(value).map_err(invalid)?),
            TransportKind::OsSpooler => {
                Self::OsSpooler(serde_json::from_value(value).map_err(invalid)?)
            }
        })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Usb(_) => TransportKind::Usb,
            Self::Serial(_) => TransportKind::Serial,
            Self::Network(_) => TransportKind::Network,
            Self::File(_) => TransportKind::File,
            Self::OsSpooler(_) => TransportKind::OsSpooler,
        }
    }

    /// Short human-readable description of the physical target.
    pub fn target(&self) -> String {
        match self {
            Self::Usb(c) => format!("usb {:04x}:{:04x}", c.vendor_id, c.product_id),
            Self::Serial(c) => format!("serial {}", c.port),
            Self::Network(c) => match c.port {
                Some(port) => format!("network {}:{}", c.host, port),
                None => format!("network {}", c.host),
            },
            Self::File(c) => format!("file {}", c.path),
            Self::OsSpooler(c) => format!("os-spooler {}", c.printer_name),
        }
    }
}

/// Accept integers as JSON numbers, decimal strings, or `0x`-prefixed hex strings.
fn flexible_int<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    let raw = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n,
        NumberOrText::Text(text) => parse_int(&text)
            .ok_or_else(|| de::Error::custom(format!("not an integer: {text:?}")))?,
    };
    T::try_from(raw).map_err(|_| de::Error::custom(format!("{raw} is out of range")))
}

fn parse_int(text: &str) -> Option<u64> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

// ---------------------------------------------------------------------------
// Registry snapshots
// ---------------------------------------------------------------------------

/// Public view of one registered connection. Never touches hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub handle: PrinterHandle,
    pub display_name: String,
    pub transport: TransportKind,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connected {
    pub handle: PrinterHandle,
    pub display_name: String,
    pub transport: TransportKind,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Where a catalog entry was enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogOrigin {
    OsInstalled,
    UsbDirect,
}

/// Readiness as reported (or guessed) by the enumeration backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    Error,
    Unknown,
}

/// One printer that could be connected to right now.
///
/// `index` is only meaningful within the catalog query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub index: usize,
    pub name: String,
    pub port: Option<String>,
    pub driver: Option<String>,
    /// Transport a connect by reference to this entry opens.
    pub kind: Option<TransportKind>,
    pub readiness: Readiness,
    pub origin: CatalogOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
}

/// Catalog lookup key: ordinal index or exact display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogReference {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for CatalogReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Print jobs
// ---------------------------------------------------------------------------

/// Raw payload body: a whitespace-separated hex-pair string or plain bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawData {
    Hex(String),
    Bytes(Vec<u8>),
}

/// One step of a structured print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ActionWire")]
#[serde(tag = "verb", rename_all = "kebab-case")]
pub enum Action {
    EmitText { text: String },
    EmitRaw { bytes: RawData },
    SetAttribute { attribute: String, value: String },
    CutPaper,
}

/// Wire forms accepted for an action: the verb vocabulary and the older
/// `{"action": ...}` spelling used by existing browser clients.
#[derive(Deserialize)]
#[serde(untagged)]
enum ActionWire {
    Verb(VerbAction),
    Legacy(LegacyAction),
}

#[derive(Deserialize)]
#[serde(tag = "verb", rename_all = "kebab-case")]
enum VerbAction {
    EmitText { text: String },
    EmitRaw { bytes: RawData },
    SetAttribute { attribute: String, value: String },
    CutPaper,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum LegacyAction {
    Text {
        #[serde(default)]
        data: String,
    },
    Raw {
        data: RawData,
    },
    Set {
        attribute: String,
        value: String,
    },
    Cut,
}

impl From<ActionWire> for Action {
    fn from(wire: ActionWire) -> Self {
        match wire {
            ActionWire::Verb(VerbAction::EmitText { text })
            | ActionWire::Legacy(LegacyAction::Text { data: text }) => Self::EmitText { text },
            ActionWire::Verb(VerbAction::EmitRaw { bytes })
            | ActionWire::Legacy(LegacyAction::Raw { data: bytes }) => Self::EmitRaw { bytes },
            ActionWire::Verb(VerbAction::SetAttribute { attribute, value })
            | ActionWire::Legacy(LegacyAction::Set { attribute, value }) => {
                Self::SetAttribute { attribute, value }
            }
            ActionWire::Verb(VerbAction::CutPaper) | ActionWire::Legacy(LegacyAction::Cut) => {
                Self::CutPaper
            }
        }
    }
}

/// Body of a print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "kebab-case")]
pub enum Payload {
    Text(String),
    Raw(RawData),
    StructuredCommands(Vec<Action>),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Raw(_) => "raw",
            Self::StructuredCommands(_) => "structured-commands",
        }
    }
}

/// A transient print request targeting one handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintJob {
    pub handle: PrinterHandle,
    pub payload: Payload,
    pub cut: bool,
}

impl PrintJob {
    pub fn new(handle: impl Into<PrinterHandle>, payload: Payload) -> Self {
        Self {
            handle: handle.into(),
            payload,
            cut: false,
        }
    }

    pub fn with_cut(mut self, cut: bool) -> Self {
        self.cut = cut;
        self
    }
}

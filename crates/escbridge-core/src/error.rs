// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for escbridge.

use serde::Serialize;
use thiserror::Error;

use escbridge_escpos::{AttributeError, EncodeError};

use crate::types::TransportKind;

/// Top-level error type for all escbridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Request shape --
    #[error("invalid request: {0}")]
    Validation(String),

    // -- Registry state --
    #[error("printer \"{0}\" is not connected")]
    HandleNotFound(String),

    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("printer \"{0}\" is already connected")]
    DuplicateHandle(String),

    // -- Transport --
    #[error("could not open {transport} printer: {cause}")]
    Connection {
        transport: TransportKind,
        cause: String,
    },

    #[error("{transport} printer rejected the job: {cause}")]
    Write {
        transport: TransportKind,
        cause: String,
    },

    // -- Payload content --
    #[error("unsupported attribute \"{0}\"")]
    UnsupportedAttribute(String),

    #[error("invalid value \"{value}\" for attribute \"{attribute}\"")]
    InvalidAttributeValue { attribute: String, value: String },

    #[error("malformed raw data: {0}")]
    MalformedRawData(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    // -- Platform collaborators --
    #[error("feature not available on this platform: {0}")]
    PlatformUnavailable(String),

    // -- Configuration --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Shorthand for a transport-open failure.
    pub fn connection(transport: TransportKind, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            transport,
            cause: cause.to_string(),
        }
    }

    /// Shorthand for a hardware write failure.
    pub fn write(transport: TransportKind, cause: impl std::fmt::Display) -> Self {
        Self::Write {
            transport,
            cause: cause.to_string(),
        }
    }

    /// Stable classification used at the request boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Serialization(_) | Self::Encode(_) => {
                ErrorKind::Validation
            }
            Self::HandleNotFound(_) => ErrorKind::HandleNotFound,
            Self::PrinterNotFound(_) => ErrorKind::PrinterNotFound,
            Self::DuplicateHandle(_) => ErrorKind::DuplicateHandle,
            Self::Connection { .. } | Self::PlatformUnavailable(_) => ErrorKind::Connection,
            Self::Write { .. } | Self::Io(_) => ErrorKind::Write,
            Self::UnsupportedAttribute(_) => ErrorKind::UnsupportedAttribute,
            Self::InvalidAttributeValue { .. } => ErrorKind::InvalidAttributeValue,
            Self::MalformedRawData(_) => ErrorKind::MalformedRawData,
        }
    }
}

impl From<AttributeError> for BridgeError {
    fn from(err: AttributeError) -> Self {
        match err {
            AttributeError::Unsupported(name) => Self::UnsupportedAttribute(name),
            AttributeError::InvalidValue { attribute, value } => {
                Self::InvalidAttributeValue { attribute, value }
            }
        }
    }
}

/// Boundary-level error code, one per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    HandleNotFound,
    PrinterNotFound,
    DuplicateHandle,
    Connection,
    Write,
    UnsupportedAttribute,
    InvalidAttributeValue,
    MalformedRawData,
}

impl ErrorKind {
    /// HTTP-style status code the outer transport should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Validation
            | Self::UnsupportedAttribute
            | Self::InvalidAttributeValue
            | Self::MalformedRawData => 400,
            Self::HandleNotFound | Self::PrinterNotFound => 404,
            Self::DuplicateHandle => 409,
            Self::Connection | Self::Write => 502,
        }
    }

    /// Whether the caller may succeed by retrying the identical request later.
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::Write)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the point-of-sale page that called us.
//
// Every error is mapped to a short sentence plus a concrete suggestion, so a
// cashier staring at a browser alert knows whether to fix the request, the
// cable, or simply try again.

use crate::error::BridgeError;

/// Severity of an error from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Printer busy, cable wiggled, timeout. Trying again may work.
    Transient,
    /// Someone must act first (connect the printer, pick another handle).
    ActionRequired,
    /// The request itself is wrong and will fail every time.
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What to try next.
    pub suggestion: String,
    /// Whether repeating the identical request could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `BridgeError` into a `HumanError`.
pub fn humanize_error(err: &BridgeError) -> HumanError {
    match err {
        BridgeError::Validation(detail) => HumanError {
            message: "The print request was not understood.".into(),
            suggestion: format!("Check the fields sent by the page. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::HandleNotFound(handle) => HumanError {
            message: format!("Printer \"{handle}\" is not connected."),
            suggestion: "Connect it first using /printer/connect or /printer/connect-by-name."
                .into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BridgeError::PrinterNotFound(reference) => HumanError {
            message: format!("No printer matches \"{reference}\"."),
            suggestion: "Refresh the printer list and pick an entry from the latest result."
                .into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BridgeError::DuplicateHandle(handle) => HumanError {
            message: format!("A printer is already connected as \"{handle}\"."),
            suggestion: "Disconnect it first or choose a different printer id.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BridgeError::Connection { transport, cause } => humanize_transport_error(
            &format!("We couldn't open the {transport} printer."),
            cause,
        ),

        BridgeError::Write { transport, cause } => humanize_transport_error(
            &format!("The {transport} printer did not accept the job."),
            cause,
        ),

        BridgeError::UnsupportedAttribute(name) => HumanError {
            message: format!("\"{name}\" is not a printer setting we know."),
            suggestion: "Use one of: align, text_size, font.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::InvalidAttributeValue { attribute, value } => HumanError {
            message: format!("\"{value}\" is not a valid {attribute}."),
            suggestion: match attribute.as_str() {
                "align" => "Use left, center or right.".into(),
                "font" => "Use a or b.".into(),
                _ => "Use normal, b, tall, wide or double.".into(),
            },
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::MalformedRawData(detail) => HumanError {
            message: "The raw printer data is not valid hex.".into(),
            suggestion: format!(
                "Send pairs of hex digits separated by spaces, like \"1B 40\". ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::Encode(err) => HumanError {
            message: format!("The printer cannot print this {}.", err.what),
            suggestion: format!(
                "Use characters from the bridge's code page, or send raw bytes instead. ({})",
                err.cause
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::PlatformUnavailable(what) => HumanError {
            message: format!("{what} is not available on this computer."),
            suggestion: "Connect the printer over USB, serial or network instead.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        BridgeError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "A file the bridge needs could not be found.".into(),
                suggestion: "Check the configuration file path.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The bridge is not allowed to open that file.".into(),
                suggestion: "Check the file permissions of the configuration or device node."
                    .into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        BridgeError::Serialization(_) => HumanError {
            message: "The request body is not valid JSON.".into(),
            suggestion: "Send a JSON object with Content-Type: application/json.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

/// Turn a transport cause string into something a cashier can act on.
fn humanize_transport_error(message: &str, cause: &str) -> HumanError {
    let lower = cause.to_ascii_lowercase();

    let (suggestion, severity) = if lower.contains("timed out") || lower.contains("timeout") {
        (
            "The printer didn't respond in time. Check it's on and connected, then try again."
                .to_string(),
            Severity::Transient,
        )
    } else if lower.contains("connection refused") {
        (
            "The printer refused the connection. Check the address and port, or turn the printer off and on again."
                .to_string(),
            Severity::Transient,
        )
    } else if lower.contains("access") || lower.contains("permission") {
        (
            "The bridge is not allowed to use this device. On Linux, add a udev rule or run with access to the device."
                .to_string(),
            Severity::ActionRequired,
        )
    } else if lower.contains("busy") {
        (
            "Another program is using the printer. Close it and try again.".to_string(),
            Severity::Transient,
        )
    } else if lower.contains("not found") || lower.contains("no such") {
        (
            "The printer was not found. Check the cable and the configuration.".to_string(),
            Severity::ActionRequired,
        )
    } else {
        (
            format!("Check the printer is on and connected, then try again. (Detail: {cause})"),
            Severity::Transient,
        )
    };

    HumanError {
        message: message.to_string(),
        suggestion,
        retriable: severity == Severity::Transient,
        severity,
    }
}

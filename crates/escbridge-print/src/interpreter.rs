// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command interpreter: turns one print job payload into an ordered sequence
// of driver calls.
//
// Interpretation happens in two phases. `plan` validates the whole payload
// (hex tokens, attribute names and values) and produces a list of steps
// without touching the driver; `execute` then replays the steps in order.
// A payload-content error therefore never leaves a half-written buffer.
// A driver failure during `execute` aborts the remaining steps and is not
// rolled back.

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{Action, Payload, PrintJob, RawData};
use escbridge_escpos::TextAttribute;
use tracing::{debug, trace};

use crate::driver::Driver;

/// One validated driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Text(String),
    Raw(Vec<u8>),
    Attribute(TextAttribute),
    Cut,
}

/// Parse a whitespace-separated hex-pair string such as `"1B 40"`.
///
/// Each token may carry a `0x` prefix and must then be exactly two hex
/// digits. Any other token fails the whole string.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .enumerate()
        .map(|(position, token)| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.len() != 2 {
                return Err(BridgeError::MalformedRawData(format!(
                    "token {position} (\"{token}\") is not a two-digit hex byte"
                )));
            }
            match hex::decode(digits) {
                Ok(bytes) => Ok(bytes[0]),
                Err(e) => Err(BridgeError::MalformedRawData(format!(
                    "token {position} (\"{token}\"): {e}"
                ))),
            }
        })
        .collect()
}

fn raw_bytes(raw: &RawData) -> Result<Vec<u8>> {
    match raw {
        RawData::Hex(text) => parse_hex(text),
        RawData::Bytes(bytes) => Ok(bytes.clone()),
    }
}

/// Validate a payload and lay out the driver calls it requires.
pub fn plan(payload: &Payload, cut: bool) -> Result<Vec<Step>> {
    let mut steps = match payload {
        Payload::Text(text) => vec![Step::Text(text.clone())],
        Payload::Raw(raw) => vec![Step::Raw(raw_bytes(raw)?)],
        Payload::StructuredCommands(actions) => actions
            .iter()
            .map(|action| match action {
                Action::EmitText { text } => Ok(Step::Text(text.clone())),
                Action::EmitRaw { bytes } => raw_bytes(bytes).map(Step::Raw),
                Action::SetAttribute { attribute, value } => TextAttribute::parse(attribute, value)
                    .map(Step::Attribute)
                    .map_err(BridgeError::from),
                Action::CutPaper => Ok(Step::Cut),
            })
            .collect::<Result<Vec<_>>>()?,
    };
    if cut {
        steps.push(Step::Cut);
    }
    Ok(steps)
}

/// Replay steps against a driver, stopping at the first failure.
pub fn execute(driver: &mut dyn Driver, steps: &[Step]) -> Result<()> {
    for step in steps {
        trace!(?step, "driver call");
        match step {
            Step::Text(text) => driver.write_text(text)?,
            Step::Raw(bytes) => driver.write_raw(bytes)?,
            Step::Attribute(attribute) => driver.set_attribute(*attribute)?,
            Step::Cut => driver.cut()?,
        }
    }
    Ok(())
}

/// Plan and execute one job. Flushing is left to the caller.
pub fn run(driver: &mut dyn Driver, job: &PrintJob) -> Result<()> {
    let steps = plan(&job.payload, job.cut)?;
    debug!(
        handle = %job.handle,
        payload = job.payload.kind_name(),
        steps = steps.len(),
        "interpreting print job"
    );
    execute(driver, &steps)
}

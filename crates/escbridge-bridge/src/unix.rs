// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS bridge for Linux and macOS.
//
// Enumeration shells out to `lpstat`, submission pipes the job into
// `lp -o raw`. Both run with `LC_ALL=C` so the output can be parsed.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::TransportKind;
use tracing::{debug, warn};

use crate::traits::*;

/// Default limit on one `lp`/`lpstat` run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bridge to the CUPS command-line tools.
#[derive(Debug, Clone)]
pub struct CupsSpooler {
    lp: String,
    lpstat: String,
    timeout: Duration,
}

impl Default for CupsSpooler {
    fn default() -> Self {
        Self {
            lp: "lp".into(),
            lpstat: "lpstat".into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Why a tool run produced no usable result.
#[derive(Debug)]
enum ToolError {
    Spawn(io::Error),
    Wait(io::Error),
    TimedOut(Duration),
}

/// What a finished tool run left behind.
struct ToolOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// Outcome of piping the input; `Err` when the tool stopped reading.
    input: io::Result<()>,
}

impl CupsSpooler {
    /// Use non-default tool paths (e.g. `/usr/local/bin/lp`).
    pub fn with_tools(lp: impl Into<String>, lpstat: impl Into<String>) -> Self {
        Self {
            lp: lp.into(),
            lpstat: lpstat.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `program` with `args`, feeding it `input`, killing it after the
    /// configured timeout.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> std::result::Result<ToolOutput, ToolError> {
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ToolError::Spawn)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let timeout = self.timeout;

        std::thread::scope(|scope| {
            let writer = scope.spawn(move || match (stdin, input) {
                // The pipe closes when `pipe` drops, which ends the tool's input.
                (Some(mut pipe), Some(data)) => pipe.write_all(data).and_then(|()| pipe.flush()),
                _ => Ok(()),
            });
            let out_reader = scope.spawn(move || drain(stdout));
            let err_reader = scope.spawn(move || drain(stderr));

            let status = wait_bounded(&mut child, timeout)?;
            let input = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("input writer panicked")));
            Ok(ToolOutput {
                status,
                stdout: out_reader.join().unwrap_or_default(),
                stderr: err_reader.join().unwrap_or_default(),
                input,
            })
        })
    }

    fn lpstat(&self, flag: &str) -> Result<String> {
        let output = self
            .run(&self.lpstat, &[flag], None)
            .map_err(|e| tool_failure(&self.lpstat, e, BridgeError::connection))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        // lpstat exits non-zero when no queue exists at all.
        if stderr.contains("No destinations added") {
            return Ok(String::new());
        }
        Err(BridgeError::connection(
            TransportKind::OsSpooler,
            format!("{} {flag} failed: {}", self.lpstat, stderr.trim()),
        ))
    }
}

/// Wait for `child` until `timeout`, killing it on expiry or wait failure.
fn wait_bounded(
    child: &mut Child,
    timeout: Duration,
) -> std::result::Result<ExitStatus, ToolError> {
    let deadline = Instant::now() + timeout;
    loop {
        let outcome = match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() < deadline => None,
            Ok(None) => Some(ToolError::TimedOut(timeout)),
            Err(e) => Some(ToolError::Wait(e)),
        };
        if let Some(err) = outcome {
            if let Err(e) = child.kill() {
                warn!(error = %e, "could not kill spooler tool");
            }
            // Reap so no zombie is left behind.
            let _ = child.wait();
            return Err(err);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!(error = %e, "spooler tool output unreadable");
        }
    }
    buf
}

fn tool_failure(
    tool: &str,
    err: ToolError,
    classify: fn(TransportKind, String) -> BridgeError,
) -> BridgeError {
    match err {
        ToolError::Spawn(e) if e.kind() == io::ErrorKind::NotFound => {
            BridgeError::PlatformUnavailable(format!("CUPS ({tool} not installed)"))
        }
        ToolError::Spawn(e) | ToolError::Wait(e) => {
            classify(TransportKind::OsSpooler, format!("{tool}: {e}"))
        }
        ToolError::TimedOut(limit) => classify(
            TransportKind::OsSpooler,
            format!("{tool} timed out after {}ms and was killed", limit.as_millis()),
        ),
    }
}

impl PlatformBridge for CupsSpooler {
    fn platform_name(&self) -> &str {
        "CUPS"
    }
}

impl PrinterEnumerator for CupsSpooler {
    fn installed_printers(&self) -> Result<Vec<InstalledPrinter>> {
        let status = self.lpstat("-p")?;
        let devices = self.lpstat("-v")?;
        let mut printers = parse_printer_status(&status);
        for (name, uri) in parse_device_uris(&devices) {
            if let Some(printer) = printers.iter_mut().find(|p| p.name == name) {
                printer.port = Some(uri);
            }
        }
        debug!(count = printers.len(), "enumerated CUPS printers");
        Ok(printers)
    }
}

impl SpoolerSubmit for CupsSpooler {
    fn submit_raw(&self, printer_name: &str, document_name: &str, data: &[u8]) -> Result<()> {
        let output = self
            .run(
                &self.lp,
                &["-d", printer_name, "-o", "raw", "-t", document_name],
                Some(data),
            )
            .map_err(|e| tool_failure(&self.lp, e, BridgeError::write))?;

        // A job lp did not read in full must never be reported as printed.
        if let Err(e) = output.input {
            return Err(BridgeError::write(
                TransportKind::OsSpooler,
                format!("lp -d {printer_name} did not accept the whole job: {e}"),
            ));
        }

        if output.status.success() {
            debug!(
                printer = printer_name,
                bytes = data.len(),
                job = %String::from_utf8_lossy(&output.stdout).trim(),
                "submitted raw job to CUPS"
            );
            Ok(())
        } else {
            Err(BridgeError::write(
                TransportKind::OsSpooler,
                format!(
                    "lp -d {printer_name} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

/// Parse `lpstat -p` lines such as
/// `printer Kitchen is idle.  enabled since ...` or
/// `printer Bar disabled since ...`.
fn parse_printer_status(output: &str) -> Vec<InstalledPrinter> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("printer ")?;
            let (name, state) = rest.split_once(' ')?;
            Some(InstalledPrinter {
                name: name.to_string(),
                port: None,
                driver: None,
                ready: Some(!state.contains("disabled")),
            })
        })
        .collect()
}

/// Parse `lpstat -v` lines: `device for Kitchen: usb://EPSON/TM-T20`.
fn parse_device_uris(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("device for ")?;
            let (name, uri) = rest.split_once(": ")?;
            Some((name.to_string(), uri.trim().to_string()))
        })
        .collect()
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request façade: the boundary the HTTP layer calls into.
//
// Requests arrive as deserialised JSON bodies using the field names browser
// clients already send (`printer_id`, `type`, `config`, `data`, `commands`,
// `cut`). The façade validates them, runs the registry on the blocking
// thread pool, and maps every outcome to either a success body or a
// `Rejection` carrying a status code and a human-readable message. It is the
// only place where an error kind becomes a boundary status.

use std::sync::Arc;

use escbridge_core::error::{BridgeError, ErrorKind, Result};
use escbridge_core::human_errors::humanize_error;
use escbridge_core::types::{
    Action, CatalogEntry, CatalogReference, ConnectionInfo, Payload, PrintJob, PrinterHandle,
    RawData, TransportConfig, TransportKind,
};
use escbridge_escpos::{CodePage, Encoder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectRequest {
    pub printer_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TransportKind>,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectByNameRequest {
    /// Exact display name from the catalog.
    pub name: Option<String>,
    /// Catalog index; wins over `name` when both are sent.
    pub id: Option<usize>,
    pub printer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisconnectRequest {
    pub printer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintKind {
    #[default]
    Text,
    Raw,
    #[serde(alias = "structured-commands", alias = "commands")]
    Escpos,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrintRequest {
    pub printer_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: PrintKind,
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub commands: Vec<Action>,
    #[serde(default)]
    pub cut: bool,
}

impl PrintRequest {
    /// Validate the request shape and build the job it describes.
    pub fn into_job(self) -> Result<PrintJob> {
        let handle = self
            .printer_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| BridgeError::Validation("printer_id is required".into()))?;

        let payload = match self.kind {
            PrintKind::Text => match self.data {
                None | Some(serde_json::Value::Null) => Payload::Text(String::new()),
                Some(serde_json::Value::String(text)) => Payload::Text(text),
                Some(_) => {
                    return Err(BridgeError::Validation("text data must be a string".into()));
                }
            },
            PrintKind::Raw => {
                let data = self
                    .data
                    .ok_or_else(|| BridgeError::Validation("raw print needs data".into()))?;
                let raw: RawData = serde_json::from_value(data).map_err(|_| {
                    BridgeError::Validation(
                        "raw data must be a hex string or an array of bytes".into(),
                    )
                })?;
                Payload::Raw(raw)
            }
            PrintKind::Escpos => Payload::StructuredCommands(self.commands),
        };

        Ok(PrintJob::new(handle, payload).with_cut(self.cut))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    pub printer_id: PrinterHandle,
    pub printer_name: String,
    pub connection_type: TransportKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
    pub disconnected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrintResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResponse {
    pub printers: Vec<CatalogEntry>,
    pub count: usize,
    pub system: &'static str,
    /// Enumeration problems that were degraded to an empty partial list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPrinter {
    pub printer_id: PrinterHandle,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    pub status: &'static str,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl From<ConnectionInfo> for ConnectedPrinter {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            printer_id: info.handle,
            name: info.display_name,
            kind: info.transport,
            status: "connected",
            connected_at: info.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedResponse {
    pub printers: Vec<ConnectedPrinter>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandLibrary {
    pub name: &'static str,
    pub version: &'static str,
    pub available: bool,
    pub code_page: CodePage,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub command_library: CommandLibrary,
    pub printers_connected: usize,
    pub printer_ids: Vec<PrinterHandle>,
}

/// A failed request, ready to be written back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    #[serde(skip)]
    pub status: u16,
    pub success: bool,
    pub error: ErrorKind,
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
}

impl From<BridgeError> for Rejection {
    fn from(err: BridgeError) -> Self {
        let kind = err.kind();
        let human = humanize_error(&err);
        Self {
            status: kind.status_code(),
            success: false,
            error: kind,
            message: format!("{} ({err})", human.message),
            suggestion: human.suggestion,
            retriable: human.retriable,
        }
    }
}

pub type Reply<T> = std::result::Result<T, Rejection>;

// ---------------------------------------------------------------------------
// Façade
// ---------------------------------------------------------------------------

/// Async entry points over a shared `ConnectionRegistry`.
///
/// Registry calls block on hardware I/O, so each one runs on tokio's
/// blocking pool; a slow printer never stalls the accept loop.
#[derive(Clone)]
pub struct PrintBridge {
    registry: Arc<ConnectionRegistry>,
    encoder: Encoder,
}

impl PrintBridge {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            encoder: Encoder::default(),
        }
    }

    /// Encoder whose library the health check reports on.
    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConnectionRegistry) -> Result<T> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || work(&registry))
            .await
            .map_err(|e| BridgeError::Io(std::io::Error::other(format!("worker task failed: {e}"))))?
    }

    /// Catalog of printers available right now. Never fails.
    pub async fn list_printers(&self) -> CatalogResponse {
        let listing = match self.blocking(|r| Ok(r.catalog().list_all())).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "printer enumeration task failed");
                return CatalogResponse {
                    printers: Vec::new(),
                    count: 0,
                    system: std::env::consts::OS,
                    notes: vec![e.to_string()],
                };
            }
        };
        CatalogResponse {
            count: listing.entries.len(),
            printers: listing.entries,
            system: std::env::consts::OS,
            notes: listing.notes,
        }
    }

    #[instrument(skip_all, fields(printer_id = ?request.printer_id, kind = ?request.kind))]
    pub async fn connect(&self, request: ConnectRequest) -> Reply<ConnectResponse> {
        let ConnectRequest {
            printer_id,
            name,
            kind,
            config,
        } = request;
        let kind = kind.ok_or_else(|| BridgeError::Validation("type is required".into()))?;
        let config = TransportConfig::from_value(kind, config)?;

        let connected = self
            .blocking(move |r| r.connect(config, printer_id.as_deref(), name.as_deref()))
            .await?;
        Ok(ConnectResponse {
            success: true,
            message: format!("Connected to {}", connected.display_name),
            printer_id: connected.handle,
            printer_name: connected.display_name,
            connection_type: connected.transport,
        })
    }

    #[instrument(skip_all, fields(name = ?request.name, id = ?request.id))]
    pub async fn connect_by_name(&self, request: ConnectByNameRequest) -> Reply<ConnectResponse> {
        let reference = match (request.id, request.name) {
            (Some(index), _) => CatalogReference::Index(index),
            (None, Some(name)) if !name.is_empty() => CatalogReference::Name(name),
            _ => {
                return Err(BridgeError::Validation("send either name or id".into()).into());
            }
        };
        let printer_id = request.printer_id;

        let connected = self
            .blocking(move |r| r.connect_by_catalog_reference(&reference, printer_id.as_deref()))
            .await?;
        Ok(ConnectResponse {
            success: true,
            message: format!("Connected to printer: {}", connected.display_name),
            printer_id: connected.handle,
            printer_name: connected.display_name,
            connection_type: connected.transport,
        })
    }

    /// Disconnect one handle, or every handle when `printer_id` is absent.
    #[instrument(skip_all, fields(printer_id = ?request.printer_id))]
    pub async fn disconnect(&self, request: DisconnectRequest) -> Reply<DisconnectResponse> {
        match request.printer_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let handle = PrinterHandle::new(id);
                let message = format!("Printer \"{handle}\" disconnected");
                self.blocking(move |r| r.disconnect(&handle)).await?;
                Ok(DisconnectResponse {
                    success: true,
                    message,
                    disconnected: 1,
                })
            }
            None => {
                let count = self.blocking(|r| Ok(r.disconnect_all())).await?;
                Ok(DisconnectResponse {
                    success: true,
                    message: format!("All printers disconnected ({count} printers)"),
                    disconnected: count,
                })
            }
        }
    }

    #[instrument(skip_all, fields(printer_id = ?request.printer_id, kind = ?request.kind, cut = request.cut))]
    pub async fn print(&self, request: PrintRequest) -> Reply<PrintResponse> {
        let job = request.into_job()?;
        let handle = job.handle.clone();
        self.blocking(move |r| r.dispatch(&job)).await?;
        info!(printer_id = %handle, "print job sent");
        Ok(PrintResponse {
            success: true,
            message: format!("Print job sent successfully to {handle}"),
        })
    }

    pub fn list_connected(&self) -> ConnectedResponse {
        let printers: Vec<ConnectedPrinter> = self
            .registry
            .list_connected()
            .into_iter()
            .map(ConnectedPrinter::from)
            .collect();
        ConnectedResponse {
            count: printers.len(),
            printers,
        }
    }

    pub fn health(&self) -> HealthResponse {
        let printer_ids: Vec<PrinterHandle> = self
            .registry
            .list_connected()
            .into_iter()
            .map(|info| info.handle)
            .collect();
        HealthResponse {
            status: "ok",
            command_library: CommandLibrary {
                name: escbridge_escpos::LIBRARY_NAME,
                version: escbridge_escpos::LIBRARY_VERSION,
                available: self.encoder.is_available(),
                code_page: self.encoder.code_page(),
            },
            printers_connected: printer_ids.len(),
            printer_ids,
        }
    }

    /// Close every driver before the process exits.
    pub async fn shutdown(&self) {
        if let Err(e) = self
            .blocking(|r| {
                r.shutdown();
                Ok(())
            })
            .await
        {
            warn!(error = %e, "registry shutdown task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PrinterCatalog;
    use crate::driver::DriverFactory;
    use crate::testing::{Call, FakeSpooler, FakeUsb, RecordingFactory, installed, target};
    use serde_json::json;

    fn bridge() -> (PrintBridge, Arc<RecordingFactory>) {
        let factory = Arc::new(RecordingFactory::default());
        let drivers: Arc<dyn DriverFactory> = factory.clone();
        let catalog = PrinterCatalog::new(
            Arc::new(FakeSpooler::with(vec![installed("Kitchen", "10.0.0.7:9100")])),
            Arc::new(FakeUsb(Vec::new())),
        );
        let registry = Arc::new(ConnectionRegistry::new(drivers, catalog));
        (PrintBridge::new(registry), factory)
    }

    fn request<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> T {
        serde_json::from_value(body).expect("request body")
    }

    async fn connect_network(bridge: &PrintBridge, id: &str, host: &str) -> ConnectResponse {
        bridge
            .connect(request(json!({
                "printer_id": id,
                "type": "network",
                "config": {"host": host, "port": 9100}
            })))
            .await
            .expect("connect")
    }

    #[tokio::test]
    async fn connect_print_and_disconnect() {
        let (bridge, factory) = bridge();
        let connected = connect_network(&bridge, "counter", "10.0.0.1").await;
        assert_eq!(connected.printer_id.as_str(), "counter");
        assert_eq!(connected.connection_type, TransportKind::Network);

        bridge
            .print(request(json!({
                "printer_id": "counter",
                "type": "raw",
                "data": "1B 40"
            })))
            .await
            .expect("print");
        assert_eq!(
            factory.calls(&target("10.0.0.1")),
            vec![Call::Byte(0x1B), Call::Byte(0x40), Call::Flush]
        );

        let reply = bridge
            .disconnect(request(json!({"printer_id": "counter"})))
            .await
            .expect("disconnect");
        assert_eq!(reply.disconnected, 1);
        assert_eq!(bridge.list_connected().count, 0);
    }

    #[tokio::test]
    async fn escpos_commands_accept_both_vocabularies() {
        let (bridge, factory) = bridge();
        connect_network(&bridge, "p", "10.0.0.1").await;
        bridge
            .print(request(json!({
                "printer_id": "p",
                "type": "escpos",
                "commands": [
                    {"verb": "set-attribute", "attribute": "align", "value": "center"},
                    {"action": "text", "data": "Hi"},
                    {"action": "cut"}
                ]
            })))
            .await
            .expect("print");
        let calls = factory.calls(&target("10.0.0.1"));
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], Call::Text("Hi".into()));
        assert_eq!(calls[2], Call::Cut);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (bridge, _) = bridge();

        let missing_id = bridge
            .print(request(json!({"type": "text", "data": "x"})))
            .await
            .err()
            .expect("printer_id required");
        assert_eq!(missing_id.status, 400);
        assert_eq!(missing_id.error, ErrorKind::Validation);

        let unknown = bridge
            .print(request(json!({"printer_id": "ghost", "data": "x"})))
            .await
            .err()
            .expect("not connected");
        assert_eq!(unknown.status, 404);
        assert!(!unknown.success);

        connect_network(&bridge, "p", "10.0.0.1").await;
        let duplicate = bridge
            .connect(request(json!({
                "printer_id": "p",
                "type": "network",
                "config": {"host": "10.0.0.2"}
            })))
            .await
            .err()
            .expect("duplicate");
        assert_eq!(duplicate.status, 409);

        let malformed = bridge
            .print(request(json!({"printer_id": "p", "type": "raw", "data": "1B 4"})))
            .await
            .err()
            .expect("odd hex");
        assert_eq!(malformed.error, ErrorKind::MalformedRawData);
        assert_eq!(malformed.status, 400);

        let no_type = bridge
            .connect(request(json!({"printer_id": "q", "config": {}})))
            .await
            .err()
            .expect("type required");
        assert_eq!(no_type.status, 400);
    }

    #[tokio::test]
    async fn connect_by_name_uses_the_catalog() {
        let (bridge, factory) = bridge();
        let listing = bridge.list_printers().await;
        assert_eq!(listing.count, 1);
        assert_eq!(listing.printers[0].name, "Kitchen");

        let connected = bridge
            .connect_by_name(request(json!({"id": 0, "printer_id": "k"})))
            .await
            .expect("by index");
        assert_eq!(connected.printer_name, "Kitchen");
        assert_eq!(connected.connection_type, TransportKind::Network);
        assert_eq!(factory.opens(), 1);

        let missing = bridge
            .connect_by_name(request(json!({"id": 3})))
            .await
            .err()
            .expect("out of range");
        assert_eq!(missing.status, 404);
        assert_eq!(bridge.list_connected().count, 1);
    }

    #[tokio::test]
    async fn disconnect_without_id_closes_everything() {
        let (bridge, _) = bridge();
        for (id, host) in [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")] {
            connect_network(&bridge, id, host).await;
        }
        let health = bridge.health();
        assert_eq!(health.printers_connected, 3);
        assert_eq!(health.status, "ok");
        assert!(health.command_library.available);

        let reply = bridge
            .disconnect(DisconnectRequest::default())
            .await
            .expect("disconnect all");
        assert_eq!(reply.disconnected, 3);
        assert!(bridge.health().printer_ids.is_empty());
    }

    #[test]
    fn health_reports_the_command_library() {
        let (bridge, _) = bridge();
        let bridge = bridge.with_encoder(Encoder::new(CodePage::Cp858));
        let health = serde_json::to_value(bridge.health()).expect("json");
        assert_eq!(health["command_library"]["name"], "escpos");
        assert_eq!(health["command_library"]["available"], true);
        assert_eq!(health["command_library"]["code_page"], "cp858");
    }

    #[test]
    fn print_request_defaults_to_text() {
        let job = request::<PrintRequest>(json!({"printer_id": "p", "data": "Hello\n", "cut": true}))
            .into_job()
            .expect("job");
        assert_eq!(job.payload, Payload::Text("Hello\n".into()));
        assert!(job.cut);

        let job = request::<PrintRequest>(json!({"printer_id": "p", "type": "raw", "data": [27, 64]}))
            .into_job()
            .expect("job");
        assert_eq!(job.payload, Payload::Raw(RawData::Bytes(vec![27, 64])));
    }
}

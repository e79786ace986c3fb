// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection registry: the single authority on which printer handles exist
// and which driver backs each of them.
//
// Lock discipline:
//   * `slots` is held only for map lookups and mutations, never across
//     hardware I/O.
//   * each connected handle owns a `Mutex<ConnectionRecord>` that is held for
//     the whole driver interaction (dispatch or close). A guard is dropped on
//     every exit path, so a failed job never wedges the handle.
//
// A handle moves through absent -> connecting -> connected -> closing ->
// absent. `Connecting` and `Closing` slots reserve the name so a second
// connect under the same handle fails instead of racing the first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use escbridge_core::error::{BridgeError, Result};
use escbridge_core::types::{
    CatalogReference, Connected, ConnectionInfo, PrintJob, PrinterHandle, TransportConfig,
};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{PrinterCatalog, infer_connection};
use crate::driver::{Driver, DriverFactory};
use crate::interpreter;

/// Exclusive owner of one live driver.
struct ConnectionRecord {
    /// `None` once the driver has been closed.
    driver: Option<Box<dyn Driver>>,
}

struct LiveConnection {
    info: ConnectionInfo,
    record: Mutex<ConnectionRecord>,
}

impl LiveConnection {
    fn lock(&self) -> MutexGuard<'_, ConnectionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Slot {
    Connecting,
    Connected(Arc<LiveConnection>),
    Closing,
}

pub struct ConnectionRegistry {
    slots: Mutex<HashMap<PrinterHandle, Slot>>,
    drivers: Arc<dyn DriverFactory>,
    catalog: PrinterCatalog,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(drivers: Arc<dyn DriverFactory>, catalog: PrinterCatalog) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            drivers,
            catalog,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &PrinterCatalog {
        &self.catalog
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PrinterHandle, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick the handle for a new connection and reserve it.
    fn reserve(&self, explicit: Option<&str>, display_name: Option<&str>) -> Result<PrinterHandle> {
        let mut slots = self.slots();
        let handle = match explicit.or(display_name) {
            Some(chosen) => {
                let handle = PrinterHandle::new(chosen);
                match slots.get(&handle) {
                    None => handle,
                    Some(Slot::Connected(_)) => {
                        return Err(BridgeError::DuplicateHandle(handle.0));
                    }
                    Some(Slot::Connecting | Slot::Closing) => {
                        return Err(BridgeError::DuplicateHandle(format!(
                            "{handle} (connection in progress)"
                        )));
                    }
                }
            }
            None => loop {
                let candidate =
                    PrinterHandle(format!("printer-{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
                if !slots.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        slots.insert(handle.clone(), Slot::Connecting);
        Ok(handle)
    }

    /// Open a driver for `config` and register it.
    ///
    /// The handle is `handle` if given, else `display_name`, else a
    /// synthetic `printer-N`. The display name defaults to the handle.
    #[instrument(skip(self, config), fields(transport = %config.kind(), endpoint = %config.target()))]
    pub fn connect(
        &self,
        config: TransportConfig,
        handle: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<Connected> {
        if matches!(handle, Some(h) if h.trim().is_empty()) {
            return Err(BridgeError::Validation("printer id must not be empty".into()));
        }
        let display_name = display_name.filter(|n| !n.trim().is_empty());
        let handle = self.reserve(handle, display_name)?;

        // Hardware I/O happens with only the reservation held.
        let driver = match self.drivers.open(&config) {
            Ok(driver) => driver,
            Err(e) => {
                let mut slots = self.slots();
                if matches!(slots.get(&handle), Some(Slot::Connecting)) {
                    slots.remove(&handle);
                }
                warn!(handle = %handle, error = %e, "connect failed");
                return Err(e);
            }
        };

        let info = ConnectionInfo {
            handle: handle.clone(),
            display_name: display_name.unwrap_or(handle.as_str()).to_string(),
            transport: config.kind(),
            created_at: Utc::now(),
        };
        let connected = Connected {
            handle: info.handle.clone(),
            display_name: info.display_name.clone(),
            transport: info.transport,
        };
        let live = Arc::new(LiveConnection {
            info,
            record: Mutex::new(ConnectionRecord {
                driver: Some(driver),
            }),
        });
        self.slots().insert(handle.clone(), Slot::Connected(live));

        info!(handle = %handle, display_name = %connected.display_name, "printer connected");
        Ok(connected)
    }

    /// Resolve a catalog index or exact name and connect to it.
    ///
    /// The catalog is re-queried here; indices from an earlier listing are
    /// only valid if nothing changed in between.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub fn connect_by_catalog_reference(
        &self,
        reference: &CatalogReference,
        handle: Option<&str>,
    ) -> Result<Connected> {
        let entry = self.catalog.resolve(reference)?;
        let config = infer_connection(&entry)?;
        debug!(name = %entry.name, transport = %config.kind(), "catalog entry resolved");
        self.connect(config, handle, Some(&entry.name))
    }

    /// Close and remove one connection.
    ///
    /// Waits for an in-flight dispatch on the same handle to finish.
    #[instrument(skip(self, handle), fields(handle = %handle))]
    pub fn disconnect(&self, handle: &PrinterHandle) -> Result<()> {
        let live = {
            let mut slots = self.slots();
            match slots.get(handle) {
                Some(Slot::Connected(_)) => match slots.insert(handle.clone(), Slot::Closing) {
                    Some(Slot::Connected(live)) => live,
                    _ => return Err(BridgeError::HandleNotFound(handle.0.clone())),
                },
                _ => return Err(BridgeError::HandleNotFound(handle.0.clone())),
            }
        };

        close_connection(&live);
        self.slots().remove(handle);
        info!("printer disconnected");
        Ok(())
    }

    /// Close every connected handle. Returns how many were closed.
    ///
    /// Handles still connecting are left alone; they finish after this call.
    #[instrument(skip(self))]
    pub fn disconnect_all(&self) -> usize {
        let closing: Vec<(PrinterHandle, Arc<LiveConnection>)> = {
            let mut slots = self.slots();
            let handles: Vec<PrinterHandle> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Connected(_)))
                .map(|(handle, _)| handle.clone())
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| match slots.insert(handle.clone(), Slot::Closing) {
                    Some(Slot::Connected(live)) => Some((handle, live)),
                    _ => None,
                })
                .collect()
        };

        for (_, live) in &closing {
            close_connection(live);
        }

        let mut slots = self.slots();
        for (handle, _) in &closing {
            slots.remove(handle);
        }
        info!(count = closing.len(), "all printers disconnected");
        closing.len()
    }

    /// Run one job against its handle's driver and flush it.
    ///
    /// The handle's record stays locked from the first driver call to the
    /// end of the flush, so jobs on one printer never interleave.
    #[instrument(
        skip(self, job),
        fields(handle = %job.handle, payload = job.payload.kind_name(), cut = job.cut)
    )]
    pub fn dispatch(&self, job: &PrintJob) -> Result<()> {
        let live = match self.slots().get(&job.handle) {
            Some(Slot::Connected(live)) => Arc::clone(live),
            _ => return Err(BridgeError::HandleNotFound(job.handle.0.clone())),
        };

        let mut record = live.lock();
        let driver = record
            .driver
            .as_mut()
            .ok_or_else(|| BridgeError::HandleNotFound(job.handle.0.clone()))?;

        interpreter::run(driver.as_mut(), job)?;
        driver.flush()?;
        debug!(transport = %live.info.transport, "print job delivered");
        Ok(())
    }

    /// Snapshot of connected handles, oldest first. Never touches hardware.
    pub fn list_connected(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .slots()
            .values()
            .filter_map(|slot| match slot {
                Slot::Connected(live) => Some(live.info.clone()),
                _ => None,
            })
            .collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        infos
    }

    /// Release every driver. Called once when the server stops.
    pub fn shutdown(&self) {
        let closed = self.disconnect_all();
        if closed > 0 {
            info!(closed, "registry shut down");
        }
    }
}

fn close_connection(live: &LiveConnection) {
    let mut record = live.lock();
    if let Some(mut driver) = record.driver.take() {
        driver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Call, FakeSpooler, FakeUsb, RecordingFactory, empty_catalog, installed, network, target,
    };
    use escbridge_core::error::ErrorKind;
    use escbridge_core::types::{Action, Payload, RawData, TransportKind};
    use escbridge_escpos::{Alignment, TextAttribute};
    use std::collections::BTreeSet;
    use std::thread;
    use std::time::{Duration, Instant};

    fn registry() -> (Arc<ConnectionRegistry>, Arc<RecordingFactory>) {
        let factory = Arc::new(RecordingFactory::default());
        let drivers: Arc<dyn DriverFactory> = factory.clone();
        (Arc::new(ConnectionRegistry::new(drivers, empty_catalog())), factory)
    }

    fn handles(registry: &ConnectionRegistry) -> BTreeSet<String> {
        registry
            .list_connected()
            .into_iter()
            .map(|info| info.handle.0)
            .collect()
    }

    fn raw(handle: &str, hex: &str) -> PrintJob {
        PrintJob::new(handle, Payload::Raw(RawData::Hex(hex.into())))
    }

    #[test]
    fn handle_defaults_to_display_name_then_synthetic() {
        let (registry, _) = registry();
        let named = registry
            .connect(network("10.0.0.1"), None, Some("Kitchen"))
            .expect("connect");
        assert_eq!(named.handle.as_str(), "Kitchen");
        assert_eq!(named.display_name, "Kitchen");
        assert_eq!(named.transport, TransportKind::Network);

        let explicit = registry
            .connect(network("10.0.0.2"), Some("bar"), None)
            .expect("connect");
        assert_eq!(explicit.handle.as_str(), "bar");
        assert_eq!(explicit.display_name, "bar");

        let anonymous = registry.connect(network("10.0.0.3"), None, None).expect("connect");
        assert!(anonymous.handle.as_str().starts_with("printer-"));
        assert_ne!(
            registry.connect(network("10.0.0.4"), None, None).expect("connect").handle,
            anonymous.handle
        );
    }

    #[test]
    fn list_connected_tracks_connects_and_disconnects() {
        let (registry, _) = registry();
        let mut expected = BTreeSet::new();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            registry
                .connect(network(&format!("10.0.0.{i}")), Some(name), None)
                .expect("connect");
            expected.insert(name.to_string());
            assert_eq!(handles(&registry), expected);
        }
        for name in ["b", "d"] {
            registry.disconnect(&PrinterHandle::new(name)).expect("disconnect");
            expected.remove(name);
            assert_eq!(handles(&registry), expected);
        }
        let err = registry.disconnect(&PrinterHandle::new("b")).err().expect("already gone");
        assert_eq!(err.kind(), ErrorKind::HandleNotFound);
    }

    #[test]
    fn duplicate_handle_leaves_first_connection_untouched() {
        let (registry, factory) = registry();
        registry
            .connect(network("10.0.0.1"), Some("kitchen"), None)
            .expect("first");
        let err = registry
            .connect(network("10.0.0.2"), Some("kitchen"), None)
            .err()
            .expect("duplicate");
        assert_eq!(err.kind(), ErrorKind::DuplicateHandle);
        assert_eq!(factory.opens(), 1);

        let listed = registry.list_connected();
        assert_eq!(listed.len(), 1);
        registry.dispatch(&raw("kitchen", "1B 40")).expect("print");
        assert_eq!(
            factory.calls(&target("10.0.0.1")),
            vec![Call::Byte(0x1B), Call::Byte(0x40), Call::Flush]
        );
        assert!(factory.calls(&target("10.0.0.2")).is_empty());
    }

    #[test]
    fn same_target_may_back_two_handles() {
        let (registry, _) = registry();
        registry.connect(network("10.0.0.1"), Some("a"), None).expect("a");
        registry.connect(network("10.0.0.1"), Some("b"), None).expect("b");
        assert_eq!(registry.list_connected().len(), 2);
    }

    #[test]
    fn failed_open_registers_nothing() {
        let (registry, factory) = registry();
        factory.unreachable(&target("10.9.9.9"));
        let err = registry
            .connect(network("10.9.9.9"), Some("ghost"), None)
            .err()
            .expect("unreachable");
        assert!(matches!(
            err,
            BridgeError::Connection {
                transport: TransportKind::Network,
                ..
            }
        ));
        assert!(registry.list_connected().is_empty());
        // The reservation is released, so the handle can be used again.
        registry.connect(network("10.0.0.1"), Some("ghost"), None).expect("retry");
    }

    #[test]
    fn disconnect_all_reports_the_count_and_empties_the_registry() {
        let (registry, factory) = registry();
        for i in 0..5 {
            registry
                .connect(network(&format!("10.0.1.{i}")), None, None)
                .expect("connect");
        }
        assert_eq!(registry.disconnect_all(), 5);
        assert!(registry.list_connected().is_empty());
        assert_eq!(registry.disconnect_all(), 0);
        assert_eq!(factory.calls(&target("10.0.1.3")), vec![Call::Close]);
    }

    #[test]
    fn raw_job_writes_exact_bytes_and_malformed_hex_writes_nothing() {
        let (registry, factory) = registry();
        registry.connect(network("10.0.0.1"), Some("p"), None).expect("connect");

        registry.dispatch(&raw("p", "1B 40")).expect("print");
        assert_eq!(
            factory.calls(&target("10.0.0.1")),
            vec![Call::Byte(0x1B), Call::Byte(0x40), Call::Flush]
        );

        let err = registry.dispatch(&raw("p", "1B 4")).err().expect("odd digit");
        assert_eq!(err.kind(), ErrorKind::MalformedRawData);
        assert_eq!(factory.calls(&target("10.0.0.1")).len(), 3);
    }

    #[test]
    fn structured_job_reaches_the_driver_in_order() {
        let (registry, factory) = registry();
        registry.connect(network("10.0.0.1"), Some("p"), None).expect("connect");
        let job = PrintJob::new(
            "p",
            Payload::StructuredCommands(vec![
                Action::SetAttribute {
                    attribute: "align".into(),
                    value: "center".into(),
                },
                Action::EmitText { text: "Hi".into() },
                Action::CutPaper,
            ]),
        );
        registry.dispatch(&job).expect("print");
        assert_eq!(
            factory.calls(&target("10.0.0.1")),
            vec![
                Call::Attribute(TextAttribute::Align(Alignment::Center)),
                Call::Text("Hi".into()),
                Call::Cut,
                Call::Flush,
            ]
        );
    }

    #[test]
    fn dispatch_to_unknown_handle_fails() {
        let (registry, _) = registry();
        let err = registry
            .dispatch(&PrintJob::new("nobody", Payload::Text("x".into())))
            .err()
            .expect("absent");
        assert_eq!(err.kind(), ErrorKind::HandleNotFound);
    }

    #[test]
    fn flush_failure_surfaces_and_handle_stays_usable() {
        let (registry, factory) = registry();
        factory.failing_flush(&target("10.0.0.1"));
        registry.connect(network("10.0.0.1"), Some("p"), None).expect("connect");
        let err = registry
            .dispatch(&PrintJob::new("p", Payload::Text("x".into())))
            .err()
            .expect("paper out");
        assert_eq!(err.kind(), ErrorKind::Write);
        // The record lock was released on the error path.
        registry.disconnect(&PrinterHandle::new("p")).expect("disconnect");
    }

    #[test]
    fn write_failure_mid_job_stops_the_sequence_without_flushing() {
        let (registry, factory) = registry();
        factory.failing_write_after(&target("10.0.0.1"), 2);
        registry.connect(network("10.0.0.1"), Some("p"), None).expect("connect");

        let job = PrintJob::new(
            "p",
            Payload::StructuredCommands(vec![
                Action::SetAttribute {
                    attribute: "align".into(),
                    value: "center".into(),
                },
                Action::EmitText { text: "Hi".into() },
                Action::EmitText { text: "lost".into() },
                Action::CutPaper,
            ]),
        );
        let err = registry.dispatch(&job).err().expect("offline");
        assert_eq!(err.kind(), ErrorKind::Write);

        // Steps already written stay written; nothing after the failure runs.
        assert_eq!(
            factory.calls(&target("10.0.0.1")),
            vec![
                Call::Attribute(TextAttribute::Align(Alignment::Center)),
                Call::Text("Hi".into()),
            ]
        );

        // The record lock was released, so the handle still prints.
        registry
            .dispatch(&PrintJob::new("p", Payload::Text("again".into())))
            .expect("second job");
        let calls = factory.calls(&target("10.0.0.1"));
        assert_eq!(&calls[2..], &[Call::Text("again".into()), Call::Flush]);
    }

    #[test]
    fn concurrent_jobs_on_one_handle_do_not_interleave() {
        let (registry, factory) = registry();
        factory.slow(&target("10.0.0.1"), Duration::from_millis(1));
        registry.connect(network("10.0.0.1"), Some("p"), None).expect("connect");

        let a = vec![0xAAu8; 40];
        let b = vec![0xBBu8; 40];
        let workers: Vec<_> = [a, b]
            .into_iter()
            .map(|bytes| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .dispatch(&PrintJob::new("p", Payload::Raw(RawData::Bytes(bytes))))
                        .expect("print")
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("join");
        }

        let bytes: Vec<u8> = factory
            .calls(&target("10.0.0.1"))
            .into_iter()
            .filter_map(|call| match call {
                Call::Byte(b) => Some(b),
                _ => None,
            })
            .collect();
        assert_eq!(bytes.len(), 80);
        let switches = bytes.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(switches, 1, "jobs interleaved: {bytes:02x?}");
    }

    #[test]
    fn slow_job_on_one_handle_does_not_delay_another() {
        let (registry, factory) = registry();
        factory.slow(&target("10.0.0.1"), Duration::from_millis(5));
        registry.connect(network("10.0.0.1"), Some("slow"), None).expect("connect");
        registry.connect(network("10.0.0.2"), Some("fast"), None).expect("connect");

        let slow = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let started = Instant::now();
                registry
                    .dispatch(&PrintJob::new("slow", Payload::Raw(RawData::Bytes(vec![0; 100]))))
                    .expect("slow print");
                started.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        registry.dispatch(&raw("fast", "1B 40")).expect("fast print");
        registry.connect(network("10.0.0.3"), Some("new"), None).expect("connect");
        registry.disconnect(&PrinterHandle::new("new")).expect("disconnect");
        let fast_elapsed = started.elapsed();

        let slow_elapsed = slow.join().expect("join");
        assert!(slow_elapsed >= Duration::from_millis(450), "{slow_elapsed:?}");
        assert!(fast_elapsed < Duration::from_millis(250), "{fast_elapsed:?}");
    }

    #[test]
    fn racing_connects_under_one_handle_admit_exactly_one() {
        let (registry, factory) = registry();
        factory.delay_open(Duration::from_millis(100));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.connect(network(&format!("10.0.2.{i}")), Some("till"), None)
                })
            })
            .collect();
        let results: Vec<Result<Connected>> =
            workers.into_iter().map(|w| w.join().expect("join")).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::DuplicateHandle);
        }
        assert_eq!(factory.opens(), 1);
        assert_eq!(handles(&registry), BTreeSet::from(["till".to_string()]));
    }

    #[test]
    fn connecting_during_disconnect_all_is_never_half_registered() {
        let (registry, factory) = registry();
        for i in 0..3 {
            registry
                .connect(network(&format!("10.0.3.{i}")), None, None)
                .expect("connect");
        }
        factory.delay_open(Duration::from_millis(50));
        let connecting = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.connect(network("10.0.3.9"), Some("late"), None))
        };
        thread::sleep(Duration::from_millis(10));
        assert_eq!(registry.disconnect_all(), 3);

        connecting.join().expect("join").expect("late connect");
        assert_eq!(handles(&registry), BTreeSet::from(["late".to_string()]));
        registry.dispatch(&raw("late", "0A")).expect("usable");
    }

    #[test]
    fn catalog_reference_resolves_and_infers_transport() {
        let factory = Arc::new(RecordingFactory::default());
        let drivers: Arc<dyn DriverFactory> = factory.clone();
        let catalog = PrinterCatalog::new(
            Arc::new(FakeSpooler::with(vec![
                installed("Kitchen", "USB001"),
                installed("Bar", "192.168.1.50:9100"),
            ])),
            Arc::new(FakeUsb(Vec::new())),
        );
        let registry = ConnectionRegistry::new(drivers, catalog);

        let kitchen = registry
            .connect_by_catalog_reference(&CatalogReference::Name("Kitchen".into()), None)
            .expect("by name");
        assert_eq!(kitchen.handle.as_str(), "Kitchen");
        assert_eq!(kitchen.transport, TransportKind::OsSpooler);

        let bar = registry
            .connect_by_catalog_reference(&CatalogReference::Index(1), Some("bar"))
            .expect("by index");
        assert_eq!(bar.display_name, "Bar");
        assert_eq!(bar.transport, TransportKind::Network);
        assert_eq!(factory.opens(), 2);

        let err = registry
            .connect_by_catalog_reference(&CatalogReference::Index(2), None)
            .err()
            .expect("past the end");
        assert_eq!(err.kind(), ErrorKind::PrinterNotFound);
        let err = registry
            .connect_by_catalog_reference(&CatalogReference::Name("kitchen".into()), Some("k2"))
            .err()
            .expect("case-sensitive");
        assert_eq!(err.kind(), ErrorKind::PrinterNotFound);
        assert_eq!(registry.list_connected().len(), 2);
    }

    #[test]
    fn empty_explicit_handle_is_a_validation_error() {
        let (registry, _) = registry();
        let err = registry
            .connect(network("10.0.0.1"), Some("  "), None)
            .err()
            .expect("blank");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

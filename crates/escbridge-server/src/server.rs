// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local HTTP listener for browser print requests.
//
// Binds to the loopback address by default. Each accepted connection is
// handled in its own task: read one request, route it to the façade, write
// one response, close. Print jobs to different printers therefore run in
// parallel; jobs to the same printer are ordered by the registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use escbridge_core::error::{BridgeError, Result};
use escbridge_print::PrintBridge;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::http::{self, FramingError};
use crate::routes::{self, Response};

struct SharedState {
    bridge: PrintBridge,
    max_request_bytes: usize,
    active_connections: AtomicU32,
}

pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    shared: Arc<SharedState>,
}

impl HttpServer {
    /// Bind `address` and start accepting connections.
    pub async fn start(address: &str, bridge: PrintBridge, max_request_bytes: usize) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            BridgeError::Io(std::io::Error::new(e.kind(), format!("bind {address}: {e}")))
        })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "print bridge listening");

        let shutdown_signal = Arc::new(Notify::new());
        let shared = Arc::new(SharedState {
            bridge,
            max_request_bytes,
            active_connections: AtomicU32::new(0),
        });

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&shutdown_signal),
            Arc::clone(&shared),
        ));

        Ok(Self {
            local_addr,
            shutdown_signal,
            task_handle: Some(task_handle),
            shared,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.shared.active_connections.load(Ordering::Relaxed)
    }

    /// Stop accepting. Requests already being handled run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown_signal.notify_one();
        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|e| {
                BridgeError::Io(std::io::Error::other(format!("accept loop join: {e}")))
            })?;
        }
        info!(addr = %self.local_addr, "print bridge stopped");
        Ok(())
    }

    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, shared: Arc<SharedState>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer_addr, &state).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        state: &SharedState,
    ) -> Result<()> {
        let response = match http::read_request(&mut stream, state.max_request_bytes).await {
            Ok(request) => {
                let response = routes::route(&state.bridge, &request).await;
                info!(
                    peer = %peer_addr,
                    method = %request.method,
                    path = %request.path,
                    status = response.status,
                    "request handled"
                );
                response
            }
            Err(FramingError::Empty) => {
                debug!(peer = %peer_addr, "empty connection");
                return Ok(());
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "unreadable request");
                Response::bad_request(e.status(), e.to_string())
            }
        };

        http::write_response(&mut stream, response.status, &response.encode()).await?;
        Ok(())
    }
}

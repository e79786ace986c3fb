// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// escbridge Server: the HTTP listener that exposes the print façade to
// browser pages on the local machine.

pub mod http;
pub mod routes;
pub mod server;

pub use server::HttpServer;

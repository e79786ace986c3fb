// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Route table: maps a method and path to a façade call and serialises the
// outcome as JSON.

use escbridge_core::error::BridgeError;
use escbridge_print::facade::{PrintBridge, Rejection, Reply};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::http::Request;

/// Status code and JSON body to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

impl Response {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self::json(200, body),
            Err(e) => Self::json(
                500,
                json!({"success": false, "error": "internal", "message": e.to_string()}),
            ),
        }
    }

    fn reply<T: Serialize>(reply: Reply<T>) -> Self {
        match reply {
            Ok(value) => Self::ok(&value),
            Err(rejection) => {
                let status = rejection.status;
                let mut response = Self::ok(&rejection);
                if response.status == 200 {
                    response.status = status;
                }
                response
            }
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::json(
            404,
            json!({
                "success": false,
                "error": "not_found",
                "message": format!("The requested endpoint {path} was not found"),
            }),
        )
    }

    pub fn bad_request(status: u16, message: String) -> Self {
        Self::json(
            status,
            json!({"success": false, "error": "validation", "message": message}),
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::to_vec(body).ok())
            .unwrap_or_default()
    }
}

/// Parse a JSON body. An empty body reads as `{}` so optional-only requests
/// such as disconnect-all may omit it.
fn body<T: DeserializeOwned>(request: &Request) -> Result<T, Rejection> {
    let bytes: &[u8] = if request.body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &request.body
    };
    serde_json::from_slice(bytes).map_err(|e| {
        Rejection::from(BridgeError::Validation(format!("request body: {e}")))
    })
}

pub async fn route(bridge: &PrintBridge, request: &Request) -> Response {
    debug!(method = %request.method, path = %request.path, "routing request");
    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => Response {
            status: 204,
            body: None,
        },
        ("GET", "/health") => Response::ok(&bridge.health()),
        ("GET", "/printer/list") => Response::ok(&bridge.list_printers().await),
        ("GET", "/printer/list-connected") => Response::ok(&bridge.list_connected()),
        ("POST", "/printer/connect") => match body(request) {
            Ok(req) => Response::reply(bridge.connect(req).await),
            Err(rejection) => Response::reply::<()>(Err(rejection)),
        },
        ("POST", "/printer/connect-by-name") => match body(request) {
            Ok(req) => Response::reply(bridge.connect_by_name(req).await),
            Err(rejection) => Response::reply::<()>(Err(rejection)),
        },
        ("POST", "/printer/disconnect") => match body(request) {
            Ok(req) => Response::reply(bridge.disconnect(req).await),
            Err(rejection) => Response::reply::<()>(Err(rejection)),
        },
        ("POST", "/printer/print") => match body(request) {
            Ok(req) => Response::reply(bridge.print(req).await),
            Err(rejection) => Response::reply::<()>(Err(rejection)),
        },
        (method, path) => {
            warn!(method, path, "no such route");
            Response::not_found(path)
        }
    }
}

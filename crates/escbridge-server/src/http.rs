// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing.
//
// Only what a browser `fetch()` to a localhost bridge needs: one request per
// connection, a request line, headers, and a `Content-Length` body. Every
// response carries permissive CORS headers and `Connection: close`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub body: Vec<u8>,
}

/// Why a request could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Peer closed before sending anything.
    Empty,
    /// Peer closed mid-request.
    Truncated,
    Malformed(String),
    TooLarge { limit: usize },
    Io(String),
}

impl FramingError {
    pub fn status(&self) -> u16 {
        match self {
            Self::TooLarge { .. } => 413,
            _ => 400,
        }
    }
}

impl std::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty request"),
            Self::Truncated => f.write_str("connection closed mid-request"),
            Self::Malformed(detail) => write!(f, "malformed request: {detail}"),
            Self::TooLarge { limit } => write!(f, "request exceeds {limit} bytes"),
            Self::Io(detail) => write!(f, "read failed: {detail}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Head {
    method: String,
    path: String,
    content_length: usize,
}

fn parse_head(head: &[u8]) -> Result<Head, FramingError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| FramingError::Malformed("headers are not UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(FramingError::Malformed(format!(
            "bad request line \"{request_line}\""
        )));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(FramingError::Malformed(format!("unsupported version {version}")));
    }

    let mut content_length = 0;
    for line in lines.filter(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(FramingError::Malformed(format!("bad header \"{line}\"")));
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| FramingError::Malformed("bad Content-Length".into()))?;
        }
    }

    let path = target.split('?').next().unwrap_or(target);
    Ok(Head {
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        content_length,
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Read one request, refusing bodies over `max_body` bytes.
pub async fn read_request<R>(stream: &mut R, max_body: usize) -> Result<Request, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(end) = find_subsequence(&buf, b"\r\n\r\n") {
            break end;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(FramingError::TooLarge {
                limit: MAX_HEAD_BYTES,
            });
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| FramingError::Io(e.to_string()))?;
        if n == 0 {
            return Err(if buf.is_empty() {
                FramingError::Empty
            } else {
                FramingError::Truncated
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = parse_head(&buf[..header_end])?;
    if head.content_length > max_body {
        return Err(FramingError::TooLarge { limit: max_body });
    }

    let mut body = buf.split_off(header_end + 4);
    if body.len() < head.content_length {
        let missing = head.content_length - body.len();
        let mut rest = Vec::with_capacity(missing);
        (&mut *stream)
            .take(missing as u64)
            .read_to_end(&mut rest)
            .await
            .map_err(|e| FramingError::Io(e.to_string()))?;
        if rest.len() < missing {
            return Err(FramingError::Truncated);
        }
        body.extend_from_slice(&rest);
    }
    body.truncate(head.content_length);

    Ok(Request {
        method: head.method,
        path: head.path,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

/// Serialise a response with CORS headers. An empty body omits the type.
pub fn encode_response(status: u16, body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status} {}\r\n", reason(status));
    head.push_str("Access-Control-Allow-Origin: *\r\n");
    head.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
    head.push_str("Access-Control-Allow-Headers: Content-Type\r\n");
    head.push_str("Access-Control-Max-Age: 86400\r\n");
    if !body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str("Connection: close\r\n\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

pub async fn write_response<W>(stream: &mut W, status: u16, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&encode_response(status, body)).await?;
    stream.flush().await
}

//! Serializes request and response heads into the dump format.
//!
//! Heads are always written as HTTP/1.x text so the parser can read them back,
//! whatever protocol version actually carried the exchange.

use http::{request, response, HeaderMap, Version};

/// Raw head of an outgoing request: request line, headers, blank line.
///
/// A `Host` header is synthesized from the URI authority when the request
/// does not carry one, so the dump stays a valid HTTP/1.1 request.
pub fn request_head(parts: &request::Parts) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(parts.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(version_str(parts.version).as_bytes());
    out.extend_from_slice(b"\r\n");

    if !parts.headers.contains_key(http::header::HOST) {
        if let Some(authority) = parts.uri.authority() {
            out.extend_from_slice(b"Host: ");
            out.extend_from_slice(authority.as_str().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
    write_headers(&mut out, &parts.headers);
    out
}

/// Raw head of a response: status line, headers, blank line.
pub fn response_head(parts: &response::Parts) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(version_str(parts.version).as_bytes());
    out.push(b' ');
    out.extend_from_slice(parts.status.as_str().as_bytes());
    if let Some(reason) = parts.status.canonical_reason() {
        out.push(b' ');
        out.extend_from_slice(reason.as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    write_headers(&mut out, &parts.headers);
    out
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(canonical_name(name.as_str()).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// `content-type` -> `Content-Type`, for human-readable dumps.
fn canonical_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            canonical.push(c.to_ascii_uppercase());
        } else {
            canonical.push(c);
        }
        upper = c == '-';
    }
    canonical
}

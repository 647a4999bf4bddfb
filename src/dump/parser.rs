//! Reads a dumped exchange back into structured form.
//!
//! # Format
//! One blob holds the request dump immediately followed by the response dump,
//! with no framing between them. The split point is the second occurrence of
//! `HTTP/`: the first belongs to the request line, the second starts the
//! status line. Anything that puts `HTTP/` bytes before the status line (a
//! request body quoting a status line, say) splits in the wrong place; the
//! format keeps that limitation for compatibility with existing fixtures.
//!
//! # Bodies
//! Dumps routinely carry a body without a `Content-Length` (or with a stale
//! `Transfer-Encoding: chunked` over already-decoded bytes), so a missing or
//! non-positive length means "everything that is left" wherever a body is
//! expected, instead of "no body".

use std::path::Path;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, Version};

use super::{HeadError, ParseError, ReadError};

const MARKER: &[u8] = b"HTTP/";
const MAX_HEADERS: usize = 128;

/// Parse one raw dump into its request and response.
pub fn parse(raw: &[u8]) -> Result<(Request<Bytes>, Response<Bytes>), ParseError> {
    let (request_dump, response_dump) = split(raw)?;
    let request = parse_request(request_dump).map_err(ParseError::Request)?;
    let response = parse_response(response_dump, &request).map_err(ParseError::Response)?;
    Ok((request, response))
}

/// Read and parse the dump stored at `path`.
pub fn parse_file(path: &Path) -> Result<(Request<Bytes>, Response<Bytes>), ReadError> {
    let raw = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw).map_err(|source| ReadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Split a dump into its request and response halves.
pub fn split(raw: &[u8]) -> Result<(&[u8], &[u8]), ParseError> {
    let first = find(raw, MARKER).ok_or(ParseError::MissingRequestMarker)?;
    let after_first = first + MARKER.len();
    let second = find(&raw[after_first..], MARKER).ok_or(ParseError::MissingResponseMarker)?;
    Ok(raw.split_at(after_first + second))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_request(buf: &[u8]) -> Result<Request<Bytes>, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let head_len = match parsed.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(HeadError::Incomplete),
    };

    let method = Method::from_bytes(parsed.method.unwrap_or_default().as_bytes())
        .map_err(http::Error::from)?;
    let content_length = content_length(parsed.headers)?;

    let rest = &buf[head_len..];
    let body = match content_length {
        Some(len) => &rest[..len.min(rest.len())],
        None if reads_to_end(&method) || is_chunked(parsed.headers) => rest,
        None => &[],
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(parsed.path.unwrap_or("/"))
        .version(version(parsed.version));
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    Ok(builder.body(Bytes::copy_from_slice(body))?)
}

fn parse_response(buf: &[u8], request: &Request<Bytes>) -> Result<Response<Bytes>, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    let head_len = match parsed.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(HeadError::Incomplete),
    };

    let status = StatusCode::from_u16(parsed.code.unwrap_or_default())
        .map_err(http::Error::from)?;
    let content_length = content_length(parsed.headers)?;

    let rest = &buf[head_len..];
    let body = if !body_allowed(request.method(), status) {
        &[][..]
    } else {
        match content_length {
            Some(len) => &rest[..len.min(rest.len())],
            None => rest,
        }
    };

    let mut builder = Response::builder()
        .status(status)
        .version(version(parsed.version));
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    Ok(builder.body(Bytes::copy_from_slice(body))?)
}

/// Methods whose undeclared body runs to the end of the request dump.
fn reads_to_end(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::POST | Method::PUT)
}

fn body_allowed(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

fn version(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn header<'a>(headers: &[httparse::Header<'a>], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

/// Declared positive length; `None` when absent, zero, or negative.
fn content_length(headers: &[httparse::Header<'_>]) -> Result<Option<usize>, HeadError> {
    let Some(raw) = header(headers, "content-length") else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(raw);
    let len: i64 = text
        .trim()
        .parse()
        .map_err(|_| HeadError::ContentLength(text.to_string()))?;
    Ok(usize::try_from(len).ok().filter(|len| *len > 0))
}

fn is_chunked(headers: &[httparse::Header<'_>]) -> bool {
    header(headers, "transfer-encoding")
        .map(|value| String::from_utf8_lossy(value).to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

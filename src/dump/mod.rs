//! Dump format subsystem.
//!
//! # Data Flow
//! ```text
//! Capture:  request::Parts  → writer.rs → raw request head ┐
//!           response::Parts → writer.rs → raw response head ├→ one blob per exchange
//!           body bytes (tee'd as they stream)               ┘
//!
//! Replay:   blob → parser.rs (split on the second "HTTP/") → Request<Bytes> + Response<Bytes>
//! ```
//!
//! # Design Decisions
//! - Writer and parser live side by side so the format has one owner
//! - Heads are parsed with `httparse`; no hand-rolled HTTP grammar
//! - Everything outside this module sees structured `http` types only, so a
//!   framed format could replace marker splitting without touching replay

use std::path::PathBuf;

use thiserror::Error;

pub mod parser;
pub mod writer;

pub use parser::{parse, parse_file, split};

/// Errors from splitting or parsing a dump.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("request HTTP/ marker not found")]
    MissingRequestMarker,

    #[error("response HTTP/ marker not found")]
    MissingResponseMarker,

    #[error("read request error: {0}")]
    Request(#[source] HeadError),

    #[error("read response error: {0}")]
    Response(#[source] HeadError),
}

/// Errors from parsing a single request or response head.
#[derive(Debug, Error)]
pub enum HeadError {
    #[error("malformed head: {0}")]
    Syntax(#[from] httparse::Error),

    #[error("head is not terminated by an empty line")]
    Incomplete,

    #[error("invalid Content-Length {0:?}")]
    ContentLength(String),

    #[error(transparent)]
    Http(#[from] http::Error),
}

/// Errors from loading a dump file.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read dump {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dump {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

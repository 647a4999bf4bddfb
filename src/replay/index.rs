//! Replay index construction.
//!
//! # Responsibilities
//! - Load every dump in a fixture directory
//! - Materialize request bodies (POST/PUT) and response bodies
//! - Group exchanges by exact URL path, in directory scan order
//!
//! # Design Decisions
//! - One unreadable or corrupt fixture fails the whole build
//! - Subdirectories are skipped, which keeps body dumps out of the index
//! - Scan order is deterministic: numbered dumps ascending, then the rest
//!   by name
//! - Immutable after construction, so it is shared without locks

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::{Method, Request, Response};
use thiserror::Error;

use super::matcher::QueryParams;
use crate::dump::{self, ParseError, ReadError};
use crate::observability::metrics;

/// Errors that abort building an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to list fixture directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fixture(#[from] ReadError),
}

/// Methods whose request body takes part in matching.
pub fn is_mutating(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT
}

/// One recorded exchange, fully buffered.
#[derive(Debug)]
pub struct StoredExchange {
    request: Request<()>,
    response: Response<()>,
    request_body: Bytes,
    response_body: Bytes,
    query: QueryParams,
    source: Option<PathBuf>,
}

impl StoredExchange {
    /// Build from a parsed dump. The request body is kept for POST and PUT only.
    pub fn new(request: Request<Bytes>, response: Response<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let request_body = if is_mutating(&parts.method) {
            body
        } else {
            Bytes::new()
        };
        let query = QueryParams::from_uri(&parts.uri);
        let (response, response_body) = response.into_parts();

        Self {
            request: Request::from_parts(parts, ()),
            response: Response::from_parts(response, ()),
            request_body,
            response_body,
            query,
            source: None,
        }
    }

    pub fn from_dump(raw: &[u8]) -> Result<Self, ParseError> {
        let (request, response) = dump::parse(raw)?;
        Ok(Self::new(request, response))
    }

    pub fn load(path: &Path) -> Result<Self, ReadError> {
        let (request, response) = dump::parse_file(path)?;
        let mut exchange = Self::new(request, response);
        exchange.source = Some(path.to_path_buf());
        Ok(exchange)
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn request(&self) -> &Request<()> {
        &self.request
    }

    pub fn response(&self) -> &Response<()> {
        &self.response
    }

    pub fn request_body(&self) -> &Bytes {
        &self.request_body
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response_body
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// The dump file this exchange was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Recorded exchanges keyed by URL path.
#[derive(Debug, Default)]
pub struct ReplayIndex {
    entries: HashMap<String, Vec<StoredExchange>>,
    len: usize,
}

impl ReplayIndex {
    /// Load every dump in `dir`.
    pub fn build(dir: &Path) -> Result<Self, IndexError> {
        let files = fixture_files(dir)?;
        let mut index = Self::default();

        for file in files {
            let exchange = StoredExchange::load(&file)?;
            tracing::debug!(
                file = %file.display(),
                method = %exchange.request().method(),
                path = %exchange.path(),
                status = exchange.response().status().as_u16(),
                "Loaded fixture"
            );
            index.insert(exchange);
        }

        tracing::info!(
            dir = %dir.display(),
            fixtures = index.len(),
            paths = index.path_count(),
            "Replay index built"
        );
        metrics::set_fixtures_loaded(index.len());
        Ok(index)
    }

    /// Index already loaded exchanges, keeping their order.
    pub fn from_exchanges(exchanges: impl IntoIterator<Item = StoredExchange>) -> Self {
        let mut index = Self::default();
        for exchange in exchanges {
            index.insert(exchange);
        }
        index
    }

    fn insert(&mut self, exchange: StoredExchange) {
        self.entries
            .entry(exchange.path().to_string())
            .or_default()
            .push(exchange);
        self.len += 1;
    }

    /// Recorded exchanges for `path`, oldest first.
    pub fn candidates(&self, path: &str) -> &[StoredExchange] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn path_count(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn fixture_files(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let read_dir_error = |source| IndexError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        let metadata = fs::metadata(&path).map_err(|source| ReadError::Io {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            continue;
        }
        files.push(path);
    }

    files.sort_by_cached_key(|path| scan_order(path));
    Ok(files)
}

/// `2.log` sorts before `10.log`; names without a numeric stem come last.
fn scan_order(path: &Path) -> (u8, u64, OsString) {
    let name = path.file_name().map(OsString::from).unwrap_or_default();
    match path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<u64>().ok())
    {
        Some(n) => (0, n, name),
        None => (1, 0, name),
    }
}

//! Dump sink providers.
//!
//! # Responsibilities
//! - Allocate one uniquely numbered head sink per captured exchange
//! - Allocate one path-keyed body sink per response body
//! - Keep the storage backend swappable behind [`SinkProvider`]
//!
//! # Design Decisions
//! - Uniqueness comes from a single atomic counter, no other shared state
//! - Body dumps live under their own namespace directory so the replay
//!   index (which skips subdirectories) never mistakes them for heads
//! - Request paths with `..` segments are refused rather than resolved

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::CaptureConfig;

/// An open, append-only dump target. Dropping it closes it.
pub type Sink = Box<dyn Write + Send>;

/// Errors raised while allocating sinks.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A directory in the dump namespace could not be created.
    #[error("failed to create dump directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dump file itself could not be created.
    #[error("failed to create dump file {}: {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The request path cannot be mapped into the body namespace.
    #[error("request path {0:?} cannot be stored as a body dump")]
    InvalidPath(String),
}

/// Supplies the two kinds of sinks a capture needs.
pub trait SinkProvider: Send + Sync {
    /// A fresh sink for one exchange's head dump.
    fn exchange_sink(&self) -> Result<Sink, StorageError>;

    /// A sink for the response body of a request to `path`.
    fn body_sink(&self, path: &str) -> Result<Sink, StorageError>;
}

/// Filesystem-backed provider.
///
/// Head dumps are written as `<dir>/<n>.<head_extension>`, bodies as
/// `<dir>/<body_namespace>/<path>.<body_extension>`.
#[derive(Debug)]
pub struct DirSinkProvider {
    dir: PathBuf,
    body_namespace: String,
    head_extension: String,
    body_extension: String,
    next_id: AtomicU64,
}

impl DirSinkProvider {
    /// Open `dir` with default naming, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::from_config(&CaptureConfig {
            dir: dir.into(),
            ..CaptureConfig::default()
        })
    }

    /// Open the capture directory described by `config`.
    ///
    /// Numbering resumes after the highest head dump already present.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, StorageError> {
        create_dir_all(&config.dir)?;

        let last_id = last_dump_id(&config.dir, &config.head_extension);
        if last_id > 0 {
            tracing::debug!(dir = ?config.dir, last_id, "Resuming dump numbering");
        }

        Ok(Self {
            dir: config.dir.clone(),
            body_namespace: config.body_namespace.clone(),
            head_extension: config.head_extension.clone(),
            body_extension: config.body_extension.clone(),
            next_id: AtomicU64::new(last_id),
        })
    }

    /// Directory head dumps are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a body dump for `path` is written to.
    pub fn body_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut file = self.dir.join(&self.body_namespace);
        let mut pushed = false;
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => {
                    file.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        if !pushed || path.ends_with('/') {
            file.push("index");
        }

        let mut name = file.into_os_string();
        name.push(".");
        name.push(&self.body_extension);
        Ok(PathBuf::from(name))
    }
}

impl SinkProvider for DirSinkProvider {
    fn exchange_sink(&self) -> Result<Sink, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("{}.{}", id, self.head_extension));
        create_file(path)
    }

    fn body_sink(&self, path: &str) -> Result<Sink, StorageError> {
        let file = self.body_path(path)?;
        if let Some(parent) = file.parent() {
            create_dir_all(parent)?;
        }
        create_file(file)
    }
}

fn create_dir_all(path: &Path) -> Result<(), StorageError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(StorageError::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_file(path: PathBuf) -> Result<Sink, StorageError> {
    match File::create(&path) {
        Ok(file) => Ok(Box::new(BufWriter::new(file))),
        Err(source) => Err(StorageError::CreateFile { path, source }),
    }
}

fn last_dump_id(dir: &Path, extension: &str) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != extension {
                return None;
            }
            path.file_stem()?.to_str()?.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0)
}

type Buffer = Arc<Mutex<Vec<u8>>>;

/// In-memory provider, handy for tests and for inspecting captures in-process.
#[derive(Debug, Default, Clone)]
pub struct MemorySinkProvider {
    inner: Arc<MemoryStore>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    exchanges: Mutex<Vec<Buffer>>,
    bodies: Mutex<BTreeMap<String, Buffer>>,
    closed: AtomicUsize,
    fail_bodies: AtomicBool,
}

impl MemorySinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `body_sink` call fail.
    pub fn fail_body_sinks(&self) {
        self.inner.fail_bodies.store(true, Ordering::SeqCst);
    }

    /// Contents of the `n`th head dump (1-based, in allocation order).
    pub fn exchange(&self, n: usize) -> Option<Vec<u8>> {
        let exchanges = self.inner.exchanges.lock().ok()?;
        let buf = exchanges.get(n.checked_sub(1)?)?;
        let bytes = buf.lock().ok()?.clone();
        Some(bytes)
    }

    /// Number of head sinks allocated so far.
    pub fn exchange_count(&self) -> usize {
        self.inner.exchanges.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Contents of the body dump recorded for `path`.
    pub fn body(&self, path: &str) -> Option<Vec<u8>> {
        let bodies = self.inner.bodies.lock().ok()?;
        let bytes = bodies.get(path)?.lock().ok()?.clone();
        Some(bytes)
    }

    /// How many sinks have been closed.
    pub fn closed_count(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn sink(&self, buf: Buffer) -> Sink {
        Box::new(MemorySink {
            buf,
            store: self.inner.clone(),
        })
    }
}

impl SinkProvider for MemorySinkProvider {
    fn exchange_sink(&self) -> Result<Sink, StorageError> {
        let buf = Buffer::default();
        self.inner
            .exchanges
            .lock()
            .map_err(|_| poisoned("exchanges"))?
            .push(buf.clone());
        Ok(self.sink(buf))
    }

    fn body_sink(&self, path: &str) -> Result<Sink, StorageError> {
        if self.inner.fail_bodies.load(Ordering::SeqCst) {
            return Err(StorageError::CreateFile {
                path: PathBuf::from(path),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "body sinks disabled"),
            });
        }
        let buf = Buffer::default();
        self.inner
            .bodies
            .lock()
            .map_err(|_| poisoned(path))?
            .insert(path.to_string(), buf.clone());
        Ok(self.sink(buf))
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::CreateFile {
        path: PathBuf::from(what),
        source: io::Error::other("memory store lock poisoned"),
    }
}

struct MemorySink {
    buf: Buffer,
    store: Arc<MemoryStore>,
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .buf
            .lock()
            .map_err(|_| io::Error::other("memory sink lock poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.store.closed.fetch_add(1, Ordering::SeqCst);
    }
}

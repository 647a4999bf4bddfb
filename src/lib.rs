//! HTTP traffic recorder and replayer.
//!
//! Recording wraps an HTTP client so every exchange is dumped as raw
//! HTTP/1.1 text while the caller consumes it. Replaying loads a directory
//! of dumps and serves them back as a stand-in server.

pub mod capture;
pub mod config;
pub mod dump;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod replay;

pub use capture::{DirSinkProvider, MemorySinkProvider, Recorder, SinkProvider, Transport};
pub use config::schema::DumpConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use replay::{ReplayIndex, Replayer};

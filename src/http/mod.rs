//! HTTP plumbing for both directions.
//!
//! # Data Flow
//! ```text
//! record: Recorder → client.rs (hyper-util legacy client) → upstream
//!
//! serve:  TCP connection
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → replay handler (Replayer lookup)
//!     → recorded status, allow-listed headers, body
//! ```

pub mod client;
pub mod server;

pub use client::HttpClient;
pub use server::HttpServer;

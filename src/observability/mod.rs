//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! capture, replay, http:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments); with no recorder installed they are no-ops
//! - Log level comes from config, `RUST_LOG` overrides it

pub mod logging;
pub mod metrics;

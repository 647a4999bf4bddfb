//! Replay subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     fixture dir → index.rs (parse every dump, buffer bodies)
//!     → ReplayIndex (path → [StoredExchange], scan order)
//!
//! Per request:
//!     method + uri + body
//!     → replayer.rs (candidates for path)
//!     → matcher.rs (query subset, body equality)
//!     → ReplayedResponse | ReplayError (404 / 400)
//! ```
//!
//! # Design Decisions
//! - Built once, never mutated: shared across connections without locks
//! - First full match wins; no scoring
//! - Deterministic: same index and request always pick the same recording

pub mod index;
pub mod matcher;
pub mod replayer;

pub use index::{IndexError, ReplayIndex, StoredExchange};
pub use matcher::{IgnoreKeys, IgnoreNothing, QueryFilter, QueryParams};
pub use replayer::{ReplayError, ReplayedResponse, Replayer, REPLAYED_HEADERS};

//! stereo-sync - Lock-step pairing for stereoscopic decode pipelines
//!
//! A stereo (two elementary stream) video is decoded by two independent
//! decoder instances, one per eye, each on its own streaming thread. This
//! crate forces the two threads through the stream in lock-step: a frame is
//! only submitted for decoding once the other eye has a frame with the same
//! decode timestamp, and only released for display once the other eye has
//! one with the same presentation timestamp.
//!
//! # Architecture
//!
//! ```text
//!  decoder (base/left)                           decoder (dependent/right)
//!        │ register(pair, Base)                        │ register(pair, Dependent)
//!        ▼                                             ▼
//!  ┌──────────────────────── PairRegistry ─────────────────────────┐
//!  │  PairId ──► Arc<PairSession>                                  │
//!  │              ├── input gate  (DTS)   + 2 handshake latches    │
//!  │              ├── output gate (PTS)   + 2 handshake latches    │
//!  │              └── flush / push-abort / EOS / teardown flags    │
//!  └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every wait is bounded. Flush, downstream push failure, end-of-stream and
//! teardown all cancel waits promptly; the worst a broken stream can cause
//! is a dropped frame on one or both eyes.

pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod stats;
pub mod sync;
pub mod types;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use registry::{global_registry, PairRegistry, SessionHandle};
pub use session::PairSession;
pub use stats::SideStatsSnapshot;
pub use types::*;

//! Rendezvous primitives shared by the two decoder threads
//!
//! ```text
//!   base/left thread                         dependent/right thread
//!   ────────────────                         ──────────────────────
//!   publish(ts) ──► ┌──────────────────────┐ ◄── publish(ts)
//!                   │ RendezvousGate       │
//!   wait() ───────► │ [TimeSlot; 2] + cond │ ◄── wait()
//!                   └──────────────────────┘
//!        Matched                                   Matched
//!   signal_done ──► ┌──────────┐   ┌──────────┐ ◄── signal_done
//!                   │ latch(B) │   │ latch(D) │
//!   await(D) ─────────────────────►│          │
//!                   │          │◄───────────────── await(B)
//!                   └──────────┘   └──────────┘
//! ```
//!
//! One gate and one latch pair exist per direction (input/DTS and
//! output/PTS). The gate's slot mutex and each latch mutex are separate
//! locks and are never held together.

mod gate;
mod handshake;
mod slot;
mod wait;

pub use gate::{CancelSignals, RendezvousGate};
pub use handshake::SideHandshake;
pub use slot::TimeSlot;

pub(crate) use wait::lock;

//! McSAAB link engine.
//!
//! A [`LinkSession`] negotiates line parameters with the controller, then
//! moves H4+ frames in both directions as announced transfers over a
//! [`LinkChannel`](mcsaab_channel::LinkChannel). The session itself is a
//! non-blocking state machine; [`Link`] runs one on a worker thread with
//! wall-clock timers.
//!
//! ```text
//! Init ──negotiate──▶ Handshake ──alive──▶ Active
//!   ▲                     │                  │
//!   └──── fatal error ────┴──────────────────┘
//! ```
//!
//! Every fatal error (watchdog expiry, protocol violation, channel fault,
//! peer reset) takes one path: dump diagnostics, clear all state, report
//! `LinkDown` or `HandshakeFailed`. The owner decides whether to negotiate
//! again.

pub mod config;
pub mod control;
pub mod emulator;
pub mod error;
pub mod event;
mod handshake;
pub mod link;
mod rx;
pub mod session;
pub mod state;
#[cfg(test)]
mod testing;
pub mod timer;
mod tx;

pub use config::LinkConfig;
pub use control::{ControlQueue, CONTROL_QUEUE_CAPACITY};
pub use emulator::{Emulator, EmulatorConfig, EmulatorStats};
pub use error::{ErrorKind, LinkError, Result};
pub use event::{Event, Notification, PeerInfo};
pub use link::Link;
pub use session::{LinkSession, LinkStats, LinkStatus};
pub use state::{HandshakeStep, MainState, RecvState, SendState};
pub use timer::{Deadlines, ManualTimers, TimerKind, Timers};

//! Byte channel abstraction for McSAAB / H4+ links.
//!
//! A link runs over a full-duplex byte stream with a small control
//! sub-channel for 32-bit control words and a handful of out-of-band
//! signals:
//! - local wake (ACWAKE) and peer wake (CAWAKE)
//! - RTS/CTS flow control with optional automatic handling
//! - "transmit holding register empty" and "data ready" status queries
//!
//! This is the lowest layer. The link engine never touches hardware; it only
//! talks to a [`LinkChannel`] and reacts to the [`ChannelEvent`]s the channel
//! posts through its [`Notifier`].

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{ChannelError, Result};
pub use memory::MemoryChannel;
pub use traits::{ChannelEvent, LinkChannel, Notifier};

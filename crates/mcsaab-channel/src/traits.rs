use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Something the channel wants the link engine to know about.
///
/// Channels never call into the engine directly; they post events through the
/// [`Notifier`] installed with [`LinkChannel::set_notifier`], and the engine
/// processes them in arrival order under its own lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes are waiting to be read with [`LinkChannel::read_into`].
    DataReady,
    /// The last [`LinkChannel::write`] has left the channel.
    WriteComplete,
    /// A control word arrived on the control sub-channel.
    Control(u32),
    /// The last [`LinkChannel::write_control`] has completed.
    ControlWriteComplete,
    /// The peer wake line changed level.
    PeerWake(bool),
    /// The transmit holding register drained.
    TxEmpty,
    /// The peer pulled its reset line.
    PeerReset,
    /// The hardware reported an unrecoverable error.
    Fault(String),
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::DataReady => write!(f, "data-ready"),
            ChannelEvent::WriteComplete => write!(f, "write-complete"),
            ChannelEvent::Control(word) => write!(f, "control({word:#010x})"),
            ChannelEvent::ControlWriteComplete => write!(f, "control-write-complete"),
            ChannelEvent::PeerWake(level) => write!(f, "peer-wake({level})"),
            ChannelEvent::TxEmpty => write!(f, "tx-empty"),
            ChannelEvent::PeerReset => write!(f, "peer-reset"),
            ChannelEvent::Fault(reason) => write!(f, "fault({reason})"),
        }
    }
}

/// Callback a channel uses to post [`ChannelEvent`]s.
///
/// Must not block: implementations typically push into a queue.
pub type Notifier = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// A full-duplex byte channel with wake lines and flow control.
///
/// Writes are asynchronous: `write` and `write_control` hand the data to the
/// channel and return; completion is signalled later with
/// [`ChannelEvent::WriteComplete`] / [`ChannelEvent::ControlWriteComplete`].
/// Reads never block.
pub trait LinkChannel: Send {
    /// Install the event callback. Replaces any previous notifier.
    fn set_notifier(&mut self, notifier: Notifier);

    /// Queue bytes on the data stream.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Queue one control word on the control sub-channel.
    fn write_control(&mut self, word: u32) -> Result<()>;

    /// Copy up to `buf.len()` available bytes into `buf`. Returns 0 when
    /// nothing is available.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Drive the local wake line (ACWAKE).
    fn set_local_wake(&mut self, on: bool);

    /// Current level of the peer wake line (CAWAKE).
    fn peer_wake(&self) -> bool;

    /// True when the transmit holding register is empty.
    fn tx_empty(&self) -> bool;

    /// True when received bytes are waiting.
    fn data_ready(&self) -> bool;

    /// Change the line speed.
    fn set_speed(&mut self, baud: u32) -> Result<()>;

    /// Drive RTS (we can receive).
    fn set_rts(&mut self, on: bool);

    /// Current CTS level (the peer can receive).
    fn cts(&self) -> bool;

    /// Enable or disable automatic RTS/CTS handling.
    fn set_auto_flow(&mut self, on: bool);

    /// Drop any buffered input and abandon outstanding writes.
    fn cancel_io(&mut self);
}

impl<C: LinkChannel + ?Sized> LinkChannel for Box<C> {
    fn set_notifier(&mut self, notifier: Notifier) {
        (**self).set_notifier(notifier)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn write_control(&mut self, word: u32) -> Result<()> {
        (**self).write_control(word)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_into(buf)
    }

    fn set_local_wake(&mut self, on: bool) {
        (**self).set_local_wake(on)
    }

    fn peer_wake(&self) -> bool {
        (**self).peer_wake()
    }

    fn tx_empty(&self) -> bool {
        (**self).tx_empty()
    }

    fn data_ready(&self) -> bool {
        (**self).data_ready()
    }

    fn set_speed(&mut self, baud: u32) -> Result<()> {
        (**self).set_speed(baud)
    }

    fn set_rts(&mut self, on: bool) {
        (**self).set_rts(on)
    }

    fn cts(&self) -> bool {
        (**self).cts()
    }

    fn set_auto_flow(&mut self, on: bool) {
        (**self).set_auto_flow(on)
    }

    fn cancel_io(&mut self) {
        (**self).cancel_io()
    }
}

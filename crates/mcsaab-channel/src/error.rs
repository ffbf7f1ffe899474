/// Errors reported by a byte channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// An I/O error occurred on the underlying stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The hardware reported a fault (overrun, framing error, lost clock).
    #[error("channel fault: {0}")]
    Fault(String),

    /// The requested line speed is not supported.
    #[error("unsupported speed {0} baud")]
    UnsupportedSpeed(u32),

    /// The other end of the channel is gone.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChannelError>;

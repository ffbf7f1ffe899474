use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete H4+ frames from any `Read` stream.
///
/// Handles partial reads internally, so callers always get complete frames.
/// Unknown type tags and oversized headers are skipped the way the streaming
/// decoder skips them; they show up in [`stats`](Self::stats) instead of
/// interrupting the caller.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::with_config(&config),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.decoder.decode(&mut self.buf) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(err) if err.is_recoverable() => {
                    debug!(error = %err, "skipping undecodable input");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Decoder counters (frames, receive errors, skipped bytes).
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T> Iterator for FrameReader<T>
where
    T: Read,
{
    type Item = Result<Frame>;

    /// Yields frames until the stream ends cleanly.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Err(FrameError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}

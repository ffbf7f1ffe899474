//! Streaming H4+ frame decoder.
//!
//! The decoder is a pure byte-driven state machine:
//!
//! ```text
//! WaitType ──tag──▶ WaitHeader ──header──▶ WaitData ──payload──▶ (frame) ─┐
//!    ▲                                                                     │
//!    └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two conditions make it discard input instead of decoding it:
//! - a header declaring more payload than the buffer capacity; the excess is
//!   recorded as garbage bytes and skipped
//! - a completed frame whose length after the type tag is even; H4+ devices
//!   always send word aligned packets, so one pad byte follows and is skipped

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Where the decoder is inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Next byte is a type tag (after any pending garbage).
    WaitType,
    /// Accumulating header bytes.
    WaitHeader,
    /// Accumulating payload bytes.
    WaitData,
}

/// Running counters kept by a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete frames produced.
    pub frames: u64,
    /// Unknown type tags and oversized headers.
    pub rx_errors: u64,
    /// Headers that declared more payload than the capacity.
    pub oversized: u64,
    /// Bytes discarded through the garbage counter.
    pub garbage_skipped: u64,
}

/// Incremental decoder turning a byte stream into [`Frame`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    capacity: usize,
    packet_type: Option<PacketType>,
    header: BytesMut,
    payload: BytesMut,
    remaining: usize,
    garbage_bytes: usize,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_config(&FrameConfig::default())
    }
}

impl FrameDecoder {
    /// Create a decoder whose receive buffer holds `capacity` payload bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: DecoderState::WaitType,
            capacity,
            packet_type: None,
            header: BytesMut::with_capacity(4),
            payload: BytesMut::new(),
            remaining: 0,
            garbage_bytes: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Create a decoder from a frame configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self::with_capacity(config.rx_capacity)
    }

    /// Decode the next frame from `src`, consuming the bytes it used.
    ///
    /// Returns `Ok(None)` once `src` is exhausted without completing a frame.
    /// Recoverable errors ([`FrameError::is_recoverable`]) leave the decoder
    /// resynchronised; call again to continue with the rest of `src`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let (consumed, outcome) = self.step(src);
        src.advance(consumed);
        outcome.transpose()
    }

    /// Feed a chunk and collect every frame and error it produces, in order.
    pub fn feed(&mut self, mut input: &[u8]) -> Vec<Result<Frame>> {
        let mut out = Vec::new();
        while !input.is_empty() {
            let (consumed, outcome) = self.step(input);
            input = &input[consumed..];
            match outcome {
                Some(result) => out.push(result),
                None => break,
            }
        }
        out
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes still to be skipped before the next type tag.
    pub fn garbage_bytes(&self) -> usize {
        self.garbage_bytes
    }

    /// Skip up to `available` bytes of pending garbage and nothing more.
    ///
    /// Lets a caller that holds stream bytes back drop an oversized frame's
    /// excess without the decoder going on to read the next type tag.
    /// Returns the number of bytes skipped.
    pub fn consume_garbage(&mut self, available: usize) -> usize {
        let skip = self.garbage_bytes.min(available);
        self.garbage_bytes -= skip;
        self.stats.garbage_skipped += skip as u64;
        skip
    }

    /// Payload capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters since creation or the last [`reset`](Self::reset).
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// True when the decoder sits between frames with nothing to skip.
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::WaitType && self.garbage_bytes == 0
    }

    /// Drop any partial frame, pending garbage and counters.
    pub fn reset(&mut self) {
        self.discard();
        self.garbage_bytes = 0;
        self.stats = DecoderStats::default();
    }

    fn discard(&mut self) {
        self.state = DecoderState::WaitType;
        self.packet_type = None;
        self.header.clear();
        self.payload.clear();
        self.remaining = 0;
    }

    /// Consume bytes from `input` until a frame completes, an error occurs,
    /// or the input runs out. Returns the number of bytes consumed.
    fn step(&mut self, input: &[u8]) -> (usize, Option<Result<Frame>>) {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                DecoderState::WaitType => {
                    if self.garbage_bytes > 0 {
                        pos += self.consume_garbage(input.len() - pos);
                        continue;
                    }

                    let tag = input[pos];
                    pos += 1;
                    match PacketType::from_u8(tag) {
                        Some(packet_type) => {
                            self.packet_type = Some(packet_type);
                            self.header.clear();
                            self.state = DecoderState::WaitHeader;
                        }
                        None => {
                            self.stats.rx_errors += 1;
                            self.discard();
                            warn!(tag, "unknown H4+ packet type");
                            return (pos, Some(Err(FrameError::UnknownPacketType(tag))));
                        }
                    }
                }
                DecoderState::WaitHeader => {
                    let Some(packet_type) = self.packet_type else {
                        self.discard();
                        continue;
                    };
                    let layout = packet_type.layout();
                    let take = (layout.len - self.header.len()).min(input.len() - pos);
                    self.header.extend_from_slice(&input[pos..pos + take]);
                    pos += take;

                    if self.header.len() < layout.len {
                        continue;
                    }

                    let Some(declared) = layout.payload_len(&self.header) else {
                        self.discard();
                        continue;
                    };
                    if declared > self.capacity {
                        self.garbage_bytes = declared - self.capacity;
                        self.stats.rx_errors += 1;
                        self.stats.oversized += 1;
                        warn!(
                            packet_type = packet_type.name(),
                            declared,
                            capacity = self.capacity,
                            garbage = self.garbage_bytes,
                            "receive buffer too short"
                        );
                        self.discard();
                        return (
                            pos,
                            Some(Err(FrameError::FrameTooLarge {
                                declared,
                                capacity: self.capacity,
                            })),
                        );
                    }

                    self.remaining = declared;
                    self.payload.reserve(declared);
                    self.state = DecoderState::WaitData;
                    if declared == 0 {
                        return (pos, Some(Ok(self.complete(packet_type))));
                    }
                }
                DecoderState::WaitData => {
                    let Some(packet_type) = self.packet_type else {
                        self.discard();
                        continue;
                    };
                    let take = self.remaining.min(input.len() - pos);
                    self.payload.extend_from_slice(&input[pos..pos + take]);
                    self.remaining -= take;
                    pos += take;

                    if self.remaining == 0 {
                        return (pos, Some(Ok(self.complete(packet_type))));
                    }
                }
            }
        }

        (pos, None)
    }

    fn complete(&mut self, packet_type: PacketType) -> Frame {
        let frame = Frame {
            packet_type,
            header: self.header.split().freeze(),
            payload: self.payload.split().freeze(),
        };

        if (frame.header.len() + frame.payload.len()) % 2 == 0 {
            self.garbage_bytes += 1;
        }
        self.stats.frames += 1;
        self.discard();

        trace!(
            packet_type = packet_type.name(),
            len = frame.payload.len(),
            "decoded frame"
        );
        frame
    }
}

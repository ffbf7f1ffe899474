use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::decoder::{DecoderState, DecoderStats, FrameDecoder};
use crate::error::FrameError;

/// Tokio codec for H4+ frames.
///
/// Decoding runs the same state machine as [`FrameDecoder`]; recoverable
/// errors are skipped and counted.
#[derive(Debug, Default)]
pub struct H4Codec {
    decoder: FrameDecoder,
}

impl H4Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::with_config(config),
        }
    }

    /// Decoder counters.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for H4Codec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.decoder.decode(src) {
                Err(err) if err.is_recoverable() => {
                    debug!(error = %err, "skipping undecodable input");
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.decoder.state() != DecoderState::WaitType => {
                Err(FrameError::ConnectionClosed)
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for H4Codec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

impl Encoder<&Frame> for H4Codec {
    type Error = FrameError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip() {
        let frames = vec![
            Frame::acl(0x0001, &b"hello"[..]).unwrap(),
            Frame::event(0x0e, Bytes::from_static(&[1, 2, 3, 4])).unwrap(),
            Frame::alive(Bytes::from_static(&[0xcc, 0x00])).unwrap(),
        ];

        let mut sink = FramedWrite::new(Vec::new(), H4Codec::new());
        for frame in &frames {
            sink.send(frame.clone()).await.unwrap();
        }
        let wire = sink.into_inner();

        let mut stream = FramedRead::new(wire.as_slice(), H4Codec::new());
        let mut read = Vec::new();
        while let Some(frame) = stream.next().await {
            read.push(frame.unwrap());
        }
        assert_eq!(read, frames);
        assert_eq!(stream.decoder().stats().frames, 3);
    }

    #[tokio::test]
    async fn garbage_is_skipped() {
        let mut wire = vec![0xff, 0xfe];
        let mut buf = BytesMut::new();
        let frame = Frame::radio(0x01, Bytes::from_static(&[0xaa])).unwrap();
        encode_frame(&frame, &mut buf).unwrap();
        wire.extend_from_slice(&buf);

        let mut stream = FramedRead::new(wire.as_slice(), H4Codec::new());
        assert_eq!(stream.next().await.unwrap().unwrap(), frame);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.decoder().stats().rx_errors, 2);
    }

    #[tokio::test]
    async fn eof_inside_frame_is_an_error() {
        let wire: &[u8] = &[0x02, 0x01, 0x00, 0x08, 0x00, b'a'];
        let mut stream = FramedRead::new(wire, H4Codec::new());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}

use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame};
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Writes complete H4+ frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a complete frame, including any alignment pad (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Build and send a frame from header fields and payload.
    pub fn send(&mut self, packet_type: PacketType, fields: &[u8], payload: &[u8]) -> Result<()> {
        let frame = Frame::build(packet_type, fields, payload.to_vec())?;
        self.write_frame(&frame)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_RX_CAPACITY};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frame = Frame::acl(1, &b"hello"[..]).unwrap();
        writer.write_frame(&frame).unwrap();

        let wire = written(writer);
        assert_eq!(decode_frame(&wire, DEFAULT_RX_CAPACITY).unwrap(), frame);
    }

    #[test]
    fn padding_is_written() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_frame(&Frame::event(0x13, Bytes::from_static(&[0x01, 0x02])).unwrap())
            .unwrap();
        assert_eq!(written(writer), vec![0x04, 0x13, 0x02, 0x01, 0x02, 0x00]);
    }

    #[test]
    fn send_builds_header() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .send(PacketType::Command, &[0x03, 0x0c], &[])
            .unwrap();
        assert_eq!(written(writer), vec![0x01, 0x03, 0x0c, 0x00]);
    }

    #[test]
    fn payload_too_large_rejected() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer
            .send(PacketType::Event, &[0x0e], &[0u8; 300])
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 300, max: 255 }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn length_mismatch_rejected_before_writing() {
        let mut frame = Frame::acl(1, &b"abcd"[..]).unwrap();
        frame.payload = Bytes::from_static(b"a");
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            writer.write_frame(&frame),
            Err(FrameError::LengthMismatch { .. })
        ));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&Frame::alive(Bytes::from_static(&[0x55, 0x00])).unwrap()).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }


    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = FlakyWriter {
            kind: ErrorKind::Interrupted,
            wrote_once: false,
            flushed_once: false,
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(writer_impl);
        writer.send(PacketType::Radio, &[0x01], b"retry").unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let writer_impl = FlakyWriter {
            kind: ErrorKind::WouldBlock,
            wrote_once: false,
            flushed_once: false,
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(writer_impl);
        writer.send(PacketType::Radio, &[0x01], b"retry").unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(PacketType::Acl, &[1, 0], b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_decode_through_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frames = vec![
            Frame::event(0x0e, Bytes::from_static(&[1, 2])).unwrap(),
            Frame::sco(3, &b"z"[..]).unwrap(),
        ];
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }

        let reader = crate::reader::FrameReader::new(Cursor::new(written(writer)));
        let read: Vec<Frame> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(read, frames);
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyWriter {
        kind: ErrorKind,
        wrote_once: bool,
        flushed_once: bool,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flushed_once {
                self.flushed_once = true;
                return Err(std::io::Error::from(self.kind));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

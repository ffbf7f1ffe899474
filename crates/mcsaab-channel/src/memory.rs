use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::{ChannelError, Result};
use crate::traits::{ChannelEvent, LinkChannel, Notifier};

const INITIAL_INBOX_CAPACITY: usize = 4 * 1024;

#[derive(Default)]
struct Endpoint {
    inbox: BytesMut,
    wake: bool,
    rts: bool,
    auto_flow: bool,
    speed: u32,
    notifier: Option<Notifier>,
    closed: bool,
}

struct Shared {
    ends: [Endpoint; 2],
}

/// One end of an in-memory channel pair.
///
/// The two ends are cross-wired the way a host and a controller chip are:
/// bytes and control words written on one end arrive at the other, the local
/// wake line of one end is the peer wake line of the other, and RTS of one end
/// is CTS of the other. Writes complete immediately, so the transmit holding
/// register always reads empty.
pub struct MemoryChannel {
    shared: Arc<Mutex<Shared>>,
    side: usize,
}

impl MemoryChannel {
    /// Create a connected pair `(host, controller)`.
    pub fn pair() -> (Self, Self) {
        let shared = Arc::new(Mutex::new(Shared {
            ends: [
                Endpoint {
                    inbox: BytesMut::with_capacity(INITIAL_INBOX_CAPACITY),
                    ..Endpoint::default()
                },
                Endpoint {
                    inbox: BytesMut::with_capacity(INITIAL_INBOX_CAPACITY),
                    ..Endpoint::default()
                },
            ],
        }));
        (
            Self {
                shared: Arc::clone(&shared),
                side: 0,
            },
            Self { shared, side: 1 },
        )
    }

    /// Pulse the reset line towards the other end.
    pub fn pulse_reset(&self) {
        self.notify_peer(ChannelEvent::PeerReset);
    }

    /// Report a hardware fault on the other end.
    pub fn inject_fault(&self, reason: &str) {
        self.notify_peer(ChannelEvent::Fault(reason.to_string()));
    }

    /// Current line speed of this end.
    pub fn speed(&self) -> u32 {
        self.lock().ends[self.side].speed
    }

    /// Current level of this end's wake line.
    pub fn local_wake(&self) -> bool {
        self.lock().ends[self.side].wake
    }

    /// Current level of this end's RTS line.
    pub fn rts(&self) -> bool {
        self.lock().ends[self.side].rts
    }

    /// Number of unread bytes waiting at this end.
    pub fn pending_bytes(&self) -> usize {
        self.lock().ends[self.side].inbox.len()
    }

    fn peer(&self) -> usize {
        1 - self.side
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_peer(&self, event: ChannelEvent) {
        let notifier = self.lock().ends[self.peer()].notifier.clone();
        if let Some(notify) = notifier {
            notify(event);
        }
    }

    fn notify_self(&self, event: ChannelEvent) {
        let notifier = self.lock().ends[self.side].notifier.clone();
        if let Some(notify) = notifier {
            notify(event);
        }
    }
}

impl LinkChannel for MemoryChannel {
    fn set_notifier(&mut self, notifier: Notifier) {
        let side = self.side;
        self.lock().ends[side].notifier = Some(notifier);
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        {
            let peer = self.peer();
            let mut shared = self.lock();
            if shared.ends[peer].closed {
                return Err(ChannelError::Closed);
            }
            shared.ends[peer].inbox.extend_from_slice(bytes);
        }
        trace!(side = self.side, len = bytes.len(), "memory channel write");
        self.notify_peer(ChannelEvent::DataReady);
        self.notify_self(ChannelEvent::WriteComplete);
        Ok(())
    }

    fn write_control(&mut self, word: u32) -> Result<()> {
        if self.lock().ends[self.peer()].closed {
            return Err(ChannelError::Closed);
        }
        trace!(side = self.side, word, "memory channel control");
        self.notify_peer(ChannelEvent::Control(word));
        self.notify_self(ChannelEvent::ControlWriteComplete);
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let side = self.side;
        let mut shared = self.lock();
        let inbox = &mut shared.ends[side].inbox;
        let n = inbox.len().min(buf.len());
        buf[..n].copy_from_slice(&inbox[..n]);
        inbox.advance(n);
        Ok(n)
    }

    fn set_local_wake(&mut self, on: bool) {
        let side = self.side;
        let changed = {
            let mut shared = self.lock();
            let changed = shared.ends[side].wake != on;
            shared.ends[side].wake = on;
            changed
        };
        if changed {
            self.notify_peer(ChannelEvent::PeerWake(on));
        }
    }

    fn peer_wake(&self) -> bool {
        self.lock().ends[self.peer()].wake
    }

    fn tx_empty(&self) -> bool {
        true
    }

    fn data_ready(&self) -> bool {
        !self.lock().ends[self.side].inbox.is_empty()
    }

    fn set_speed(&mut self, baud: u32) -> Result<()> {
        if baud == 0 {
            return Err(ChannelError::UnsupportedSpeed(baud));
        }
        let side = self.side;
        self.lock().ends[side].speed = baud;
        Ok(())
    }

    fn set_rts(&mut self, on: bool) {
        let side = self.side;
        self.lock().ends[side].rts = on;
    }

    fn cts(&self) -> bool {
        self.lock().ends[self.peer()].rts
    }

    fn set_auto_flow(&mut self, on: bool) {
        let side = self.side;
        self.lock().ends[side].auto_flow = on;
    }

    fn cancel_io(&mut self) {
        let side = self.side;
        self.lock().ends[side].inbox.clear();
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        let side = self.side;
        let mut shared = self.lock();
        shared.ends[side].closed = true;
        shared.ends[side].notifier = None;
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("side", &self.side)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn collecting(channel: &mut MemoryChannel) -> mpsc::Receiver<ChannelEvent> {
        let (tx, rx) = mpsc::channel();
        channel.set_notifier(Arc::new(move |event| {
            let _ = tx.send(event);
        }));
        rx
    }

    #[test]
    fn bytes_cross_to_peer() {
        let (mut host, mut chip) = MemoryChannel::pair();
        let host_events = collecting(&mut host);
        let chip_events = collecting(&mut chip);

        host.write(b"\x07\x02\x55\x00").unwrap();

        assert_eq!(chip_events.try_recv().unwrap(), ChannelEvent::DataReady);
        assert_eq!(host_events.try_recv().unwrap(), ChannelEvent::WriteComplete);
        assert!(chip.data_ready());

        let mut buf = [0u8; 16];
        let n = chip.read_into(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\x07\x02\x55\x00");
        assert!(!chip.data_ready());
        assert_eq!(chip.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn partial_reads_keep_remainder() {
        let (mut host, mut chip) = MemoryChannel::pair();
        host.write(&[1, 2, 3, 4, 5]).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(chip.read_into(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(chip.pending_bytes(), 3);
    }

    #[test]
    fn control_words_are_delivered_as_events() {
        let (mut host, mut chip) = MemoryChannel::pair();
        let host_events = collecting(&mut host);
        let chip_events = collecting(&mut chip);

        host.write_control(0x4000_0000).unwrap();

        assert_eq!(
            chip_events.try_recv().unwrap(),
            ChannelEvent::Control(0x4000_0000)
        );
        assert_eq!(
            host_events.try_recv().unwrap(),
            ChannelEvent::ControlWriteComplete
        );
    }

    #[test]
    fn wake_and_flow_lines_are_cross_wired() {
        let (mut host, mut chip) = MemoryChannel::pair();
        let chip_events = collecting(&mut chip);

        host.set_local_wake(true);
        assert!(chip.peer_wake());
        assert_eq!(chip_events.try_recv().unwrap(), ChannelEvent::PeerWake(true));

        // Same level again is not an edge.
        host.set_local_wake(true);
        assert!(chip_events.try_recv().is_err());

        chip.set_rts(true);
        assert!(host.cts());
        chip.set_rts(false);
        assert!(!host.cts());
    }

    #[test]
    fn writes_to_dropped_end_fail() {
        let (mut host, chip) = MemoryChannel::pair();
        drop(chip);
        assert!(matches!(host.write(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(host.write_control(0), Err(ChannelError::Closed)));
    }

    #[test]
    fn cancel_io_drops_unread_input() {
        let (mut host, mut chip) = MemoryChannel::pair();
        host.write(b"stale").unwrap();
        chip.cancel_io();
        assert!(!chip.data_ready());
    }

    #[test]
    fn reset_pulse_reaches_peer() {
        let (host, mut chip) = MemoryChannel::pair();
        let chip_events = collecting(&mut chip);
        host.pulse_reset();
        assert_eq!(chip_events.try_recv().unwrap(), ChannelEvent::PeerReset);
    }

    #[test]
    fn zero_speed_rejected() {
        let (mut host, _chip) = MemoryChannel::pair();
        assert!(matches!(
            host.set_speed(0),
            Err(ChannelError::UnsupportedSpeed(0))
        ));
        host.set_speed(115_200).unwrap();
        assert_eq!(host.speed(), 115_200);
    }
}

//! Threaded driver for a [`LinkSession`].
//!
//! [`Link::spawn`] moves the session behind a mutex and starts one worker
//! thread. Channel events and owner commands arrive on a single queue, so the
//! session sees them one at a time in arrival order. The worker also owns the
//! wall clock: it sleeps until the next [`Deadlines`] entry and feeds expiries
//! back in.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mcsaab_channel::LinkChannel;
use mcsaab_frame::Frame;
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::event::{Event, Notification, PeerInfo};
use crate::session::{LinkSession, LinkStatus};
use crate::timer::Deadlines;

/// Extra wait on top of the handshake budget before `negotiate` gives up on
/// the worker.
const NEGOTIATE_SLACK: Duration = Duration::from_millis(500);

type SharedSession = Arc<Mutex<LinkSession<Box<dyn LinkChannel>, Deadlines>>>;

enum Command {
    Event(Event),
    Negotiate(SyncSender<Result<PeerInfo>>),
    /// Session state changed outside the worker; recompute deadlines and
    /// forward notifications.
    Nudge,
    Reset,
    Shutdown,
}

/// A running link.
///
/// Dropping the link stops the worker and resets the session.
pub struct Link {
    session: SharedSession,
    commands: Sender<Command>,
    config: LinkConfig,
    worker: Option<JoinHandle<()>>,
}

impl Link {
    /// Take ownership of `channel` and start the worker.
    ///
    /// Returns the link and the receiving end of its notification stream.
    /// The session starts in `Init`; call [`negotiate`](Self::negotiate) to
    /// bring the link up.
    pub fn spawn<C>(mut channel: C, config: LinkConfig) -> Result<(Self, Receiver<Notification>)>
    where
        C: LinkChannel + 'static,
    {
        config.validate()?;

        let (commands, queue) = mpsc::channel();
        let (notify_tx, notifications) = mpsc::channel();

        let events = commands.clone();
        channel.set_notifier(Arc::new(move |event| {
            let _ = events.send(Command::Event(Event::Channel(event)));
        }));

        let boxed: Box<dyn LinkChannel> = Box::new(channel);
        let session = Arc::new(Mutex::new(LinkSession::new(
            boxed,
            Deadlines::new(),
            config.clone(),
        )));

        let worker_session = Arc::clone(&session);
        let worker = thread::Builder::new()
            .name("mcsaab-link".into())
            .spawn(move || run(worker_session, queue, notify_tx))
            .map_err(|err| LinkError::Fault(format!("cannot start link worker: {err}")))?;

        Ok((
            Self {
                session,
                commands,
                config,
                worker: Some(worker),
            },
            notifications,
        ))
    }

    /// Run one negotiation attempt and wait for its outcome.
    ///
    /// Any running session is discarded first. A failure is returned as
    /// [`LinkError::Handshake`] carrying the cause's kind; the link stays in
    /// `Init` and may be negotiated again.
    pub fn negotiate(&self) -> Result<PeerInfo> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.send(Command::Negotiate(reply))?;

        let budget = self.config.handshake_budget() + NEGOTIATE_SLACK;
        match outcome.recv_timeout(budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout {
                what: "negotiation",
                after: budget,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Stopped),
        }
    }

    /// Queue a data frame. See [`LinkSession::enqueue`].
    pub fn enqueue(&self, frame: Frame) -> Result<()> {
        lock(&self.session).enqueue(frame)?;
        self.send(Command::Nudge)
    }

    /// Tear the link down. The session reports `LinkDown` or
    /// `HandshakeFailed` if it was running.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn status(&self) -> LinkStatus {
        lock(&self.session).status()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| LinkError::Stopped)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("link worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("session", &*lock(&self.session))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run(session: SharedSession, queue: Receiver<Command>, notifications: Sender<Notification>) {
    let mut waiting: Option<SyncSender<Result<PeerInfo>>> = None;

    loop {
        let deadline = lock(&session).timers().next_deadline();
        let command = match deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match queue.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match queue.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        let mut session = lock(&session);
        let mut stop = false;
        match command {
            Some(Command::Event(event)) => session.handle(event),
            Some(Command::Negotiate(reply)) => {
                if let Some(previous) = waiting.replace(reply) {
                    let _ = previous.send(Err(LinkError::Handshake {
                        kind: crate::error::ErrorKind::NotActive,
                        reason: "superseded by a new negotiation".into(),
                    }));
                }
                session.start_handshake();
            }
            Some(Command::Reset) => session.reset(),
            Some(Command::Shutdown) => {
                session.reset();
                stop = true;
            }
            Some(Command::Nudge) | None => {}
        }

        let expired = session.timers_mut().take_expired(Instant::now());
        for kind in expired {
            session.handle(kind);
        }

        while let Some(notification) = session.poll_notification() {
            match &notification {
                Notification::LinkUp(peer) => {
                    if let Some(reply) = waiting.take() {
                        let _ = reply.send(Ok(peer.clone()));
                    }
                }
                Notification::HandshakeFailed { kind, reason } => {
                    if let Some(reply) = waiting.take() {
                        let _ = reply.send(Err(LinkError::Handshake {
                            kind: *kind,
                            reason: reason.clone(),
                        }));
                    }
                }
                _ => {}
            }
            let _ = notifications.send(notification);
        }

        if stop {
            debug!("link worker stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mcsaab_channel::MemoryChannel;
    use mcsaab_frame::Frame;

    use super::*;
    use crate::emulator::{Emulator, EmulatorConfig};
    use crate::error::ErrorKind;
    use crate::state::MainState;

    const WAIT: Duration = Duration::from_secs(2);

    fn next_frame(notifications: &Receiver<Notification>) -> Frame {
        loop {
            match notifications.recv_timeout(WAIT).unwrap() {
                Notification::Frame(frame) => return frame,
                Notification::LinkDown { kind, reason } => panic!("link down: {kind} {reason}"),
                _ => {}
            }
        }
    }

    #[test]
    fn negotiates_with_emulated_controller() {
        let (host, chip) = MemoryChannel::pair();
        let emulator = Emulator::spawn(chip, EmulatorConfig::default()).unwrap();
        let (link, notifications) = Link::spawn(host, LinkConfig::default()).unwrap();

        let peer = link.negotiate().unwrap();
        assert_eq!(peer.man_id, EmulatorConfig::default().man_id);
        assert_eq!(peer.speed, 3_000_000);
        assert_eq!(link.status().main_state, MainState::Active);
        assert!(matches!(
            notifications.recv_timeout(WAIT).unwrap(),
            Notification::LinkUp(_)
        ));
        assert_eq!(emulator.stats().negotiations, 1);
    }

    #[test]
    fn frames_cross_in_both_directions() {
        let (host, chip) = MemoryChannel::pair();
        let emulator = Emulator::spawn(
            chip,
            EmulatorConfig {
                echo: true,
                ..EmulatorConfig::default()
            },
        )
        .unwrap();
        let (link, notifications) = Link::spawn(host, LinkConfig::default()).unwrap();
        link.negotiate().unwrap();

        let sent: Vec<Frame> = vec![
            Frame::acl(0x0001, &b"hello"[..]).unwrap(),
            Frame::event(0x0e, vec![1u8, 2, 3, 4]).unwrap(),
            Frame::command(0x0c03, Vec::<u8>::new()).unwrap(),
        ];
        for frame in &sent {
            link.enqueue(frame.clone()).unwrap();
        }

        for frame in &sent {
            assert_eq!(&emulator.recv_frame_timeout(WAIT).unwrap(), frame);
        }
        for frame in &sent {
            assert_eq!(&next_frame(&notifications), frame);
        }

        let status = link.status();
        assert_eq!(status.tx_id, 3);
        assert_eq!(status.rx_id, 3);
        assert_eq!(status.stats.frames_sent, 3);
        assert_eq!(status.stats.frames_received, 3);
    }

    #[test]
    fn rejected_negotiation_reports_protocol_mismatch() {
        let (host, chip) = MemoryChannel::pair();
        let _emulator = Emulator::spawn(
            chip,
            EmulatorConfig {
                reject_negotiation: true,
                ..EmulatorConfig::default()
            },
        )
        .unwrap();
        let (link, _notifications) = Link::spawn(host, LinkConfig::default()).unwrap();

        let err = link.negotiate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
        assert_eq!(link.status().main_state, MainState::Init);
    }

    #[test]
    fn silent_peer_times_out() {
        let (host, _chip) = MemoryChannel::pair();
        let config = LinkConfig {
            handshake_timeout_ms: 50,
            ..LinkConfig::default()
        };
        let (link, _notifications) = Link::spawn(host, config).unwrap();

        let started = Instant::now();
        let err = link.negotiate().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Handshake {
                kind: ErrorKind::Timeout,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(link.status().stats.handshakes == 1);
    }

    #[test]
    fn enqueue_before_negotiation_is_refused() {
        let (host, _chip) = MemoryChannel::pair();
        let (link, _notifications) = Link::spawn(host, LinkConfig::default()).unwrap();
        let err = link.enqueue(Frame::acl(1, &b"x"[..]).unwrap()).unwrap_err();
        assert!(matches!(err, LinkError::NotActive));
    }

    #[test]
    fn peer_reset_brings_link_down() {
        let (host, chip) = MemoryChannel::pair();
        let emulator = Emulator::spawn(chip, EmulatorConfig::default()).unwrap();
        let (link, notifications) = Link::spawn(host, LinkConfig::default()).unwrap();
        link.negotiate().unwrap();
        let _ = notifications.recv_timeout(WAIT).unwrap();

        emulator.pulse_reset();
        match notifications.recv_timeout(WAIT).unwrap() {
            Notification::LinkDown { kind, .. } => assert_eq!(kind, ErrorKind::Timeout),
            other => panic!("unexpected notification {other:?}"),
        }

        // The next attempt succeeds.
        link.negotiate().unwrap();
        assert_eq!(emulator.stats().negotiations, 2);
    }

    #[test]
    fn controller_reboot_renegotiates() {
        let (host, chip) = MemoryChannel::pair();
        let emulator = Emulator::spawn(chip, EmulatorConfig::default()).unwrap();
        let (link, notifications) = Link::spawn(host, LinkConfig::default()).unwrap();
        link.negotiate().unwrap();

        emulator.reboot();
        let mut restarted = false;
        loop {
            match notifications.recv_timeout(WAIT).unwrap() {
                Notification::PeerRestarted => restarted = true,
                Notification::LinkUp(_) if restarted => break,
                Notification::LinkUp(_) => {}
                other => panic!("unexpected notification {other:?}"),
            }
        }
        assert_eq!(link.status().main_state, MainState::Active);
        assert_eq!(link.status().stats.handshakes, 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (host, _chip) = MemoryChannel::pair();
        let config = LinkConfig {
            speed: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(
            Link::spawn(host, config),
            Err(LinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn explicit_reset_reports_link_down() {
        let (host, chip) = MemoryChannel::pair();
        let _emulator = Emulator::spawn(chip, EmulatorConfig::default()).unwrap();
        let (link, notifications) = Link::spawn(host, LinkConfig::default()).unwrap();
        link.negotiate().unwrap();
        let _ = notifications.recv_timeout(WAIT).unwrap();

        link.reset().unwrap();
        assert!(matches!(
            notifications.recv_timeout(WAIT).unwrap(),
            Notification::LinkDown {
                kind: ErrorKind::NotActive,
                ..
            }
        ));
    }
}

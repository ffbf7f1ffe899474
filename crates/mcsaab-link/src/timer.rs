//! Watchdog timers.
//!
//! The session never sleeps or reads a clock. It arms and cancels single-shot
//! timers through [`Timers`], and its owner feeds expiries back in as
//! [`Event::Timer`](crate::event::Event::Timer).

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// The session's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Deadline for the current handshake response.
    Handshake,
    /// CTS polling tick after the speed switch.
    CtsPoll,
    /// Transmit watchdog.
    Tx,
    /// Receive watchdog.
    Rx,
    /// Keep-alive probe while work is pending.
    KeepAlive,
}

impl TimerKind {
    pub const ALL: [TimerKind; 5] = [
        TimerKind::Handshake,
        TimerKind::CtsPoll,
        TimerKind::Tx,
        TimerKind::Rx,
        TimerKind::KeepAlive,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::Handshake => 0,
            TimerKind::CtsPoll => 1,
            TimerKind::Tx => 2,
            TimerKind::Rx => 3,
            TimerKind::KeepAlive => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerKind::Handshake => "handshake",
            TimerKind::CtsPoll => "cts_poll",
            TimerKind::Tx => "tx",
            TimerKind::Rx => "rx",
            TimerKind::KeepAlive => "keepalive",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-shot timer facility.
///
/// Arming an armed timer restarts it.
pub trait Timers: Send {
    fn arm(&mut self, kind: TimerKind, after: Duration);

    fn cancel(&mut self, kind: TimerKind);

    fn is_armed(&self, kind: TimerKind) -> bool;

    fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }
}

/// Wall-clock deadline table used by the threaded driver.
#[derive(Debug, Default)]
pub struct Deadlines {
    slots: [Option<Instant>; 5],
}

impl Deadlines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().min().copied()
    }

    /// Disarm and return every timer due at `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.slots[kind.index()]
                    .filter(|deadline| *deadline <= now)
                    .map(|deadline| (deadline, kind))
            })
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        for (_, kind) in &due {
            self.slots[kind.index()] = None;
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

impl Timers for Deadlines {
    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.slots[kind.index()] = Some(Instant::now() + after);
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }
}

/// Timers that never fire on their own.
///
/// Records what is armed and for how long; tests fire a timer by handing
/// `Event::Timer(kind)` to the session themselves.
#[derive(Debug, Default)]
pub struct ManualTimers {
    slots: [Option<Duration>; 5],
    arms: usize,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration the timer was last armed with, if it is armed.
    pub fn armed_for(&self, kind: TimerKind) -> Option<Duration> {
        self.slots[kind.index()]
    }

    /// Total number of `arm` calls.
    pub fn arm_count(&self) -> usize {
        self.arms
    }

    /// True when no timer is armed.
    pub fn all_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Timers for ManualTimers {
    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.slots[kind.index()] = Some(after);
        self.arms += 1;
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines_expire_in_order() {
        let mut deadlines = Deadlines::new();
        deadlines.arm(TimerKind::Tx, Duration::from_millis(20));
        deadlines.arm(TimerKind::KeepAlive, Duration::from_millis(5));
        deadlines.arm(TimerKind::Rx, Duration::from_secs(60));

        let next = deadlines.next_deadline().unwrap();
        assert!(next <= Instant::now() + Duration::from_millis(5));

        let expired = deadlines.take_expired(Instant::now() + Duration::from_millis(30));
        assert_eq!(expired, vec![TimerKind::KeepAlive, TimerKind::Tx]);
        assert!(!deadlines.is_armed(TimerKind::Tx));
        assert!(deadlines.is_armed(TimerKind::Rx));
    }

    #[test]
    fn nothing_expires_early() {
        let mut deadlines = Deadlines::new();
        deadlines.arm(TimerKind::Handshake, Duration::from_secs(1));
        assert!(deadlines.take_expired(Instant::now()).is_empty());
        assert!(deadlines.is_armed(TimerKind::Handshake));
    }

    #[test]
    fn cancel_all_disarms_everything() {
        let mut deadlines = Deadlines::new();
        for kind in TimerKind::ALL {
            deadlines.arm(kind, Duration::from_millis(1));
        }
        deadlines.cancel_all();
        assert_eq!(deadlines.next_deadline(), None);
    }

    #[test]
    fn manual_timers_record_durations() {
        let mut timers = ManualTimers::new();
        timers.arm(TimerKind::CtsPoll, Duration::from_millis(1));
        timers.arm(TimerKind::CtsPoll, Duration::from_millis(2));
        assert_eq!(
            timers.armed_for(TimerKind::CtsPoll),
            Some(Duration::from_millis(2))
        );
        assert_eq!(timers.arm_count(), 2);
        timers.cancel(TimerKind::CtsPoll);
        assert!(timers.all_idle());
    }
}

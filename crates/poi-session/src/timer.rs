//! Session timers.
//!
//! A [`TimerSet`] holds one deadline per [`TimerKind`]. The session actor
//! sleeps until the earliest deadline and then pops whatever has expired.
//! Arming a running timer restarts it; stopping an unarmed timer does
//! nothing.
//!
//! Deadlines use `tokio::time::Instant`, so tests running on a paused clock
//! drive them deterministically.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The four session timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Bounds the wait for a customer action.
    UserInput,
    /// Bounds a device-internal request/reply exchange.
    NonUserInput,
    Heartbeat,
    Ping,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::UserInput,
        TimerKind::NonUserInput,
        TimerKind::Heartbeat,
        TimerKind::Ping,
    ];

    fn index(self) -> usize {
        match self {
            Self::UserInput => 0,
            Self::NonUserInput => 1,
            Self::Heartbeat => 2,
            Self::Ping => 3,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UserInput => "user-input",
            Self::NonUserInput => "non-user-input",
            Self::Heartbeat => "heartbeat",
            Self::Ping => "ping",
        };
        f.write_str(name)
    }
}

/// One optional deadline per timer kind.
///
/// # Examples
///
/// ```
/// use poi_session::timer::{TimerKind, TimerSet};
/// use std::time::Duration;
///
/// let mut timers = TimerSet::new();
/// timers.arm(TimerKind::Ping, Duration::from_secs(5));
/// assert!(timers.is_armed(TimerKind::Ping));
///
/// timers.stop(TimerKind::Ping);
/// timers.stop(TimerKind::Ping);
/// assert!(timers.next_deadline().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimerSet {
    deadlines: [Option<Instant>; 4],
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) `kind` to fire `after` from now.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.arm_at(kind, Instant::now() + after);
    }

    pub fn arm_at(&mut self, kind: TimerKind, deadline: Instant) {
        self.deadlines[kind.index()] = Some(deadline);
    }

    pub fn stop(&mut self, kind: TimerKind) {
        self.deadlines[kind.index()] = None;
    }

    pub fn stop_all(&mut self) {
        self.deadlines = [None; 4];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind.index()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.index()]
    }

    /// Earliest armed deadline, ignoring `excluded`.
    pub fn next_deadline_except(&self, excluded: &[TimerKind]) -> Option<(TimerKind, Instant)> {
        TimerKind::ALL
            .into_iter()
            .filter(|kind| !excluded.contains(kind))
            .filter_map(|kind| self.deadline(kind).map(|at| (kind, at)))
            .min_by_key(|(_, at)| *at)
    }

    pub fn next_deadline(&self) -> Option<(TimerKind, Instant)> {
        self.next_deadline_except(&[])
    }

    /// Disarm and return one timer whose deadline is at or before `now`.
    /// Earlier deadlines are returned first.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerKind> {
        let (kind, at) = self.next_deadline()?;
        if at > now {
            return None;
        }
        self.stop(kind);
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_arm_restarts_instead_of_stacking() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::UserInput, Duration::from_secs(10));
        let first = timers.deadline(TimerKind::UserInput).unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        timers.arm(TimerKind::UserInput, Duration::from_secs(10));
        let second = timers.deadline(TimerKind::UserInput).unwrap();

        assert_eq!(second - first, Duration::from_secs(4));
        assert_eq!(timers.pop_expired(first), None);
        assert_eq!(timers.pop_expired(second), Some(TimerKind::UserInput));
        assert!(!timers.is_armed(TimerKind::UserInput));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_expired_in_deadline_order() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Heartbeat, Duration::from_secs(15));
        timers.arm(TimerKind::Ping, Duration::from_secs(5));
        timers.arm(TimerKind::UserInput, Duration::from_secs(30));

        let now = Instant::now() + Duration::from_secs(20);
        assert_eq!(timers.pop_expired(now), Some(TimerKind::Ping));
        assert_eq!(timers.pop_expired(now), Some(TimerKind::Heartbeat));
        assert_eq!(timers.pop_expired(now), None);
        assert!(timers.is_armed(TimerKind::UserInput));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline_except() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::NonUserInput, Duration::from_secs(1));
        timers.arm(TimerKind::Ping, Duration::from_secs(5));

        let (kind, _) = timers
            .next_deadline_except(&[TimerKind::NonUserInput])
            .unwrap();
        assert_eq!(kind, TimerKind::Ping);

        timers.stop_all();
        assert!(timers.next_deadline().is_none());
    }
}

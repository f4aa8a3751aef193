// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use log::trace;
use tokio::time::{Duration, Instant};

/// Collapses bursts of map notifications into one settled evaluation.
///
/// The scheduler only tracks timing. Whoever acts on [`fire_if_due`] reads
/// the current camera at that moment, never a value captured at notify time.
///
/// [`fire_if_due`]: DebounceScheduler::fire_if_due
#[derive(Debug)]
pub struct DebounceScheduler {
    window: Duration,
    deadline: Option<Instant>,
    coalesced: u32,
}

impl DebounceScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            coalesced: 0,
        }
    }

    /// Records a notification and pushes the deadline out by one window.
    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
        self.coalesced += 1;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once per settled burst.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                trace!("Debounce fired — coalesced={}", self.coalesced);
                self.deadline = None;
                self.coalesced = 0;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.coalesced = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_fires_once() {
        let start = Instant::now();
        let mut d = DebounceScheduler::new(Duration::from_millis(500));
        d.notify(start);
        d.notify(start + Duration::from_millis(100));
        d.notify(start + Duration::from_millis(300));
        assert!(!d.fire_if_due(start + Duration::from_millis(600)));
        assert!(d.fire_if_due(start + Duration::from_millis(800)));
        assert!(!d.fire_if_due(start + Duration::from_millis(900)));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_quiet_scheduler_never_fires() {
        let mut d = DebounceScheduler::new(Duration::from_millis(500));
        assert!(!d.fire_if_due(Instant::now() + Duration::from_secs(10)));
    }

    #[test]
    fn test_cancel_drops_pending_burst() {
        let now = Instant::now();
        let mut d = DebounceScheduler::new(Duration::from_millis(50));
        d.notify(now);
        d.cancel();
        assert!(!d.fire_if_due(now + Duration::from_secs(1)));
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use std::fmt;

/// Identifies one fetch attempt on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Last-ticket-wins sequencing for one independent fetch stream.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: u64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_ticket(&mut self) -> FetchTicket {
        self.latest += 1;
        FetchTicket(self.latest)
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 == self.latest
    }

    /// Makes every ticket issued so far stale without issuing a new one.
    pub fn invalidate(&mut self) {
        self.latest += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_is_current() {
        let mut seq = RequestSequencer::new();
        let t1 = seq.next_ticket();
        assert!(seq.is_current(t1));
        let t2 = seq.next_ticket();
        assert!(t1 < t2);
        assert!(!seq.is_current(t1));
        assert!(seq.is_current(t2));
    }

    #[test]
    fn test_invalidate_supersedes_outstanding() {
        let mut seq = RequestSequencer::new();
        let t1 = seq.next_ticket();
        seq.invalidate();
        assert!(!seq.is_current(t1));
        let t2 = seq.next_ticket();
        assert!(seq.is_current(t2));
    }

    #[test]
    fn test_streams_are_independent() {
        let mut clusters = RequestSequencer::new();
        let mut records = RequestSequencer::new();
        let c = clusters.next_ticket();
        let _ = records.next_ticket();
        let _ = records.next_ticket();
        assert!(clusters.is_current(c));
    }
}

//! Outbound delivery queue: per-tick drain under a byte budget, one unacknowledged
//! frame in flight per node, bounded resends.
//!
//! Entry lifecycle: queued (attempt 0) → in flight (attempt 1) → resent every
//! `RESEND_AFTER` up to `MAX_RESENDS` times → dropped. An ack from the node removes
//! its in-flight entry. `ack` entries are fire-and-forget: sent once, never tracked.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::identity::ShortAddr;
use crate::protocol::{Function, MAX_RESENDS, RESEND_AFTER, TICK_BYTE_BUDGET};

#[derive(Debug, Clone)]
pub struct Entry {
    pub frame: Vec<u8>,
    pub destination: ShortAddr,
    pub function: Function,
    /// Physical transmissions so far.
    pub attempt: u8,
    pub sent_at: Option<Instant>,
}

/// Result of an ack from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The in-flight entry was removed. `more_pending` if others are still queued.
    Released { more_pending: bool },
    /// Nothing was in flight to that node.
    Spurious,
}

#[derive(Debug, Default)]
pub struct DeliveryQueue {
    entries: Vec<Entry>,
    in_flight: HashSet<ShortAddr>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, frame: Vec<u8>, destination: ShortAddr, function: Function) {
        self.entries.push(Entry {
            frame,
            destination,
            function,
            attempt: 0,
            sent_at: None,
        });
    }

    /// Frames to transmit this tick, in queue order.
    pub fn drain(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut sent_bytes = 0usize;
        let mut acked: HashSet<ShortAddr> = HashSet::new();
        let mut i = 0;
        while i < self.entries.len() && sent_bytes < TICK_BYTE_BUDGET {
            let destination = self.entries[i].destination;
            if self.entries[i].function == Function::Ack {
                let entry = self.entries.remove(i);
                debug!(%destination, "tx ack");
                sent_bytes += entry.frame.len();
                acked.insert(destination);
                out.push(entry.frame);
                continue;
            }
            if acked.contains(&destination) {
                i += 1;
                continue;
            }
            let entry = &mut self.entries[i];
            if !self.in_flight.contains(&destination) {
                entry.attempt = 1;
                entry.sent_at = Some(now);
                self.in_flight.insert(destination);
                debug!(%destination, function = %entry.function, attempt = entry.attempt, "tx");
                sent_bytes += entry.frame.len();
                out.push(entry.frame.clone());
            } else if entry.attempt > 0 && Self::timed_out(entry, now) {
                if entry.attempt > MAX_RESENDS {
                    warn!(
                        %destination,
                        function = %entry.function,
                        "no ack after {} attempts, dropping",
                        entry.attempt
                    );
                    self.entries.remove(i);
                    self.in_flight.remove(&destination);
                    continue;
                }
                entry.attempt += 1;
                entry.sent_at = Some(now);
                debug!(%destination, function = %entry.function, attempt = entry.attempt, "tx resend");
                sent_bytes += entry.frame.len();
                out.push(entry.frame.clone());
            }
            i += 1;
        }
        out
    }

    fn timed_out(entry: &Entry, now: Instant) -> bool {
        entry
            .sent_at
            .map(|t| now.saturating_duration_since(t) > RESEND_AFTER)
            .unwrap_or(false)
    }

    pub fn on_ack(&mut self, source: ShortAddr) -> AckOutcome {
        if !self.in_flight.remove(&source) {
            return AckOutcome::Spurious;
        }
        self.entries
            .retain(|e| !(e.destination == source && e.attempt > 0));
        AckOutcome::Released {
            more_pending: self.targets(source),
        }
    }

    /// Drop everything queued for `destination` and release it. Returns entries dropped.
    pub fn remove_destination(&mut self, destination: ShortAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.destination != destination);
        self.in_flight.remove(&destination);
        before - self.entries.len()
    }

    /// True if any entry targets `destination`.
    pub fn targets(&self, destination: ShortAddr) -> bool {
        self.entries.iter().any(|e| e.destination == destination)
    }

    pub fn in_flight(&self, destination: ShortAddr) -> bool {
        self.in_flight.contains(&destination)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Per-segment send bookkeeping: retransmission timers, the unacknowledged
/// set, and the in-flight byte total.
///
/// In-flight bytes count each segment once: the first transmission adds the
/// payload length, retransmissions only refresh the timer. A segment that was
/// retransmitted since its last acknowledgement never yields an RTT sample.
#[derive(Debug, Default)]
pub struct RetransmitTracker {
    sent_once: HashSet<u32>,
    unacked: BTreeSet<u32>,
    send_times: HashMap<u32, Instant>,
    retransmitted: HashSet<u32>,
    payload_lens: HashMap<u32, usize>,
    in_flight: usize,
}

impl RetransmitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_send(&mut self, seq: u32, payload_len: usize, now: Instant) {
        if self.sent_once.insert(seq) {
            self.unacked.insert(seq);
            self.payload_lens.insert(seq, payload_len);
            self.in_flight += payload_len;
        } else {
            self.retransmitted.insert(seq);
        }
        self.send_times.insert(seq, now);
    }

    /// Releases a segment. Idempotent: acknowledging a segment that is not
    /// outstanding is a no-op. Returns the RTT sample when the segment's
    /// timing is unambiguous.
    pub fn record_ack(&mut self, seq: u32, now: Instant) -> Option<Duration> {
        if !self.unacked.remove(&seq) {
            return None;
        }
        self.in_flight -= self.payload_lens.get(&seq).copied().unwrap_or(0);
        let sent_at = self.send_times.remove(&seq);
        if self.retransmitted.remove(&seq) {
            return None;
        }
        sent_at.map(|at| now.duration_since(at))
    }

    /// Unacknowledged segments whose last transmission is older than `rto`,
    /// in ascending sequence order.
    pub fn expired(&self, now: Instant, rto: Duration) -> Vec<u32> {
        self.unacked
            .iter()
            .copied()
            .filter(|seq| {
                self.send_times
                    .get(seq)
                    .is_some_and(|sent| now.duration_since(*sent) > rto)
            })
            .collect()
    }

    pub fn oldest_unacked(&self) -> Option<u32> {
        self.unacked.first().copied()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_unacked(&self) -> bool {
        !self.unacked.is_empty()
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// Outstanding sequence numbers strictly below the cumulative ACK.
    pub fn unacked_below(&self, cum_ack: u32) -> Vec<u32> {
        self.unacked.range(..cum_ack).copied().collect()
    }

    /// Outstanding sequence numbers inside an inclusive selective range.
    pub fn unacked_in(&self, start: u32, end: u32) -> Vec<u32> {
        self.unacked.range(start..=end).copied().collect()
    }
}

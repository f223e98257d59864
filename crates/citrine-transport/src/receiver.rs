//! Receiving side: out-of-order buffering, in-order delivery, and the
//! ACK/SACK feedback the sender steers by.

use crate::consts::{
    FINAL_ACK_REPEAT, MAX_DATAGRAM_SIZE, MAX_REQUEST_ATTEMPTS, RECEIVER_IDLE_TIMEOUT, REQUEST_BYTE,
    REQUEST_TIMEOUT,
};
use crate::error::{Result, TransportError};
use crate::packet::{self, AckPacket, DataPacket, MAX_SACK_RANGES, SackRange};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info, trace};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Out-of-order buffer with an in-order delivery cursor.
///
/// `next_expected` only ever moves forward. Everything below it has been
/// appended to the assembled output; everything in the received set is at or
/// above it and still waiting for the gap in front of it to fill.
#[derive(Debug, Default)]
pub struct Reassembly {
    pending: HashMap<u32, Bytes>,
    received: BTreeSet<u32>,
    next_expected: u32,
    assembled: BytesMut,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn assembled_len(&self) -> usize {
        self.assembled.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.assembled.freeze()
    }

    /// Accepts one arriving segment and produces the ACK describing the
    /// resulting state. Segments already delivered or already buffered change
    /// nothing but are still acknowledged.
    pub fn insert(&mut self, seq: u32, payload: Bytes) -> AckPacket {
        if seq < self.next_expected || self.received.contains(&seq) {
            trace!("segment {seq} already delivered or buffered");
            return self.current_ack(Some(seq));
        }

        self.pending.insert(seq, payload);
        self.received.insert(seq);

        while let Some(payload) = self.pending.remove(&self.next_expected) {
            self.assembled.put(payload);
            self.received.remove(&self.next_expected);
            self.next_expected += 1;
        }

        self.current_ack(Some(seq))
    }

    /// ACK for the current state, with selective ranges anchored on the most
    /// recent arrival.
    pub fn current_ack(&self, recent: Option<u32>) -> AckPacket {
        AckPacket::new(self.next_expected, self.sack_ranges(recent))
    }

    fn sack_ranges(&self, recent: Option<u32>) -> Vec<SackRange> {
        let mut ranges = Vec::with_capacity(MAX_SACK_RANGES);
        let Some(recent) = recent else {
            return ranges;
        };
        if !self.received.contains(&recent) {
            // The arrival was consumed by in-order delivery; the cumulative
            // pointer already covers it.
            return ranges;
        }

        // First range: the maximal contiguous run around the recent arrival.
        let mut start = recent;
        let mut end = recent;
        while start > 0 && self.received.contains(&(start - 1)) {
            start -= 1;
        }
        while self.received.contains(&(end + 1)) {
            end += 1;
        }
        ranges.push(SackRange { start, end });

        // Second range: the lowest run that is not the recent one.
        let mut iter = self.received.iter().copied().peekable();
        while let Some(run_start) = iter.next() {
            let mut run_end = run_start;
            while let Some(&next) = iter.peek() {
                if next != run_end + 1 {
                    break;
                }
                run_end = next;
                iter.next();
            }
            if run_start != start {
                ranges.push(SackRange {
                    start: run_start,
                    end: run_end,
                });
                break;
            }
        }
        ranges
    }
}

/// Pulls one file from a sender and reassembles it byte-exact.
#[derive(Debug)]
pub struct FileReceiver {
    socket: UdpSocket,
    server: SocketAddr,
    reassembly: Reassembly,
    last_received: Option<u32>,
}

impl FileReceiver {
    /// Binds an ephemeral socket and performs the request/ready exchange.
    /// Gives up after the request attempt budget is exhausted.
    pub async fn connect(server: SocketAddr) -> Result<Self> {
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        for attempt in 1..=MAX_REQUEST_ATTEMPTS {
            socket.send_to(&[REQUEST_BYTE], server).await?;
            let received = timeout(REQUEST_TIMEOUT, socket.recv_from(&mut buf)).await;
            match received {
                Ok(recv) => {
                    let (len, _from) = recv?;
                    if len > 0 {
                        debug!("sender answered the transfer request");
                        return Ok(Self {
                            socket,
                            server,
                            reassembly: Reassembly::new(),
                            last_received: None,
                        });
                    }
                }
                Err(_) => debug!("no answer to transfer request (attempt {attempt})"),
            }
        }
        Err(TransportError::HandshakeExhausted(MAX_REQUEST_ATTEMPTS))
    }

    /// Receives until the end-of-stream marker and returns the file bytes.
    pub async fn receive(mut self) -> Result<Bytes> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            let received = timeout(RECEIVER_IDLE_TIMEOUT, self.socket.recv_from(&mut buf)).await;
            match received {
                Ok(recv) => {
                    let (len, from) = recv?;
                    let Ok(data) = packet::parse::<DataPacket>(Bytes::copy_from_slice(&buf[..len]))
                    else {
                        trace!("discarding malformed datagram ({len} bytes)");
                        continue;
                    };
                    if data.is_eof() {
                        debug!("end of stream at sequence {}", data.seq);
                        let final_ack = AckPacket::new(data.seq + 1, Vec::new()).to_bytes();
                        for _ in 0..FINAL_ACK_REPEAT {
                            self.socket.send_to(&final_ack, from).await?;
                        }
                        break;
                    }
                    trace!("segment {} ({} payload bytes)", data.seq, data.payload.len());
                    self.last_received = Some(data.seq);
                    let ack = self.reassembly.insert(data.seq, data.payload);
                    self.socket.send_to(&ack.to_bytes(), from).await?;
                }
                Err(_) => {
                    // The last ACK may have been lost; restate the current
                    // position so the sender can make progress again.
                    let ack = self.reassembly.current_ack(self.last_received);
                    trace!("idle, restating cum={}", ack.cum_ack);
                    self.socket.send_to(&ack.to_bytes(), self.server).await?;
                }
            }
        }
        let received = self.reassembly.into_bytes();
        info!("received {} bytes", received.len());
        Ok(received)
    }
}

/// Writes the reconstructed file in one observable step: a temp file in the
/// same directory, then a rename over the destination.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("part");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    #[test]
    fn in_order_arrivals_need_no_sack() {
        let mut r = Reassembly::new();
        for (seq, expected_cum) in [(0, 1), (1, 2), (2, 3)] {
            let ack = r.insert(seq, seg(seq as u8, 10));
            assert_eq!(ack.cum_ack, expected_cum);
            assert!(ack.sacks.is_empty());
        }
        assert_eq!(r.assembled_len(), 30);
    }

    #[test]
    fn reordered_arrivals_follow_the_feedback_contract() {
        // Arrival order 0, 2, 1, 3.
        let mut r = Reassembly::new();

        let ack = r.insert(0, seg(0, 10));
        assert_eq!((ack.cum_ack, ack.sacks.len()), (1, 0));

        let ack = r.insert(2, seg(2, 10));
        assert_eq!(ack.cum_ack, 1);
        assert_eq!(ack.sacks, vec![SackRange { start: 2, end: 2 }]);

        let ack = r.insert(1, seg(1, 10));
        assert_eq!((ack.cum_ack, ack.sacks.len()), (3, 0));

        let ack = r.insert(3, seg(3, 10));
        assert_eq!((ack.cum_ack, ack.sacks.len()), (4, 0));
    }

    #[test]
    fn duplicate_buffered_segment_is_discarded() {
        let mut r = Reassembly::new();
        r.insert(0, seg(0, 10));
        r.insert(2, seg(2, 10));
        let ack = r.insert(2, seg(9, 10));
        assert_eq!(ack.cum_ack, 1);
        assert_eq!(ack.sacks, vec![SackRange { start: 2, end: 2 }]);
        assert_eq!(r.assembled_len(), 10);

        // Delivery must use the first copy, not the duplicate.
        r.insert(1, seg(1, 10));
        assert_eq!(r.into_bytes()[20], 2);
    }

    #[test]
    fn already_delivered_segment_still_gets_an_ack() {
        let mut r = Reassembly::new();
        r.insert(0, seg(0, 10));
        r.insert(1, seg(1, 10));
        let ack = r.insert(0, seg(0, 10));
        assert_eq!(ack.cum_ack, 2);
        assert!(ack.sacks.is_empty());
        assert_eq!(r.assembled_len(), 20);
    }

    #[test]
    fn recent_run_comes_first_then_the_lowest_other_run() {
        let mut r = Reassembly::new();
        r.insert(9, seg(9, 10));
        r.insert(5, seg(5, 10));
        let ack = r.insert(3, seg(3, 10));
        assert_eq!(ack.cum_ack, 0);
        assert_eq!(
            ack.sacks,
            vec![
                SackRange { start: 3, end: 3 },
                SackRange { start: 5, end: 5 },
            ]
        );

        // With the recent arrival in a middle run, the lower run wins the
        // second slot.
        let ack = r.insert(6, seg(6, 10));
        assert_eq!(
            ack.sacks,
            vec![
                SackRange { start: 5, end: 6 },
                SackRange { start: 3, end: 3 },
            ]
        );
    }

    #[test]
    fn runs_merge_around_the_recent_arrival() {
        let mut r = Reassembly::new();
        r.insert(2, seg(2, 10));
        r.insert(4, seg(4, 10));
        let ack = r.insert(3, seg(3, 10));
        assert_eq!(ack.cum_ack, 0);
        assert_eq!(ack.sacks, vec![SackRange { start: 2, end: 4 }]);
    }

    #[test]
    fn idle_ack_reflects_state_without_a_recent_arrival() {
        let mut r = Reassembly::new();
        r.insert(0, seg(0, 10));
        let ack = r.current_ack(None);
        assert_eq!(ack.cum_ack, 1);
        assert!(ack.sacks.is_empty());
    }

    #[test]
    fn any_permutation_with_duplicates_reassembles_the_source() {
        use rand::seq::SliceRandom;

        let total = 50u32;
        let payloads: Vec<Bytes> = (0..total).map(|seq| seg(seq as u8, 64)).collect();

        let mut arrivals: Vec<u32> = (0..total).chain(0..total / 2).collect();
        arrivals.shuffle(&mut rand::rng());

        let mut r = Reassembly::new();
        for seq in arrivals {
            let ack = r.insert(seq, payloads[seq as usize].clone());
            for range in &ack.sacks {
                assert!(range.start <= range.end);
                assert!(range.start >= ack.cum_ack);
            }
        }

        assert_eq!(r.next_expected(), total);
        let mut expected = Vec::new();
        for payload in &payloads {
            expected.extend_from_slice(payload);
        }
        assert_eq!(r.into_bytes().as_ref(), expected.as_slice());
    }
}

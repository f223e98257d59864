//! Transmission engine: admission, ACK processing, loss detection and
//! retransmission for one file served to one peer.

use crate::buffer::SendBuffer;
use crate::congestion::CongestionControl;
use crate::consts::{
    DUP_ACK_THRESHOLD, MAX_DATAGRAM_SIZE, MAX_EOF_ATTEMPTS, IDLE_YIELD, RECOVERY_SWEEP_EVERY,
    REQUEST_POLL,
};
use crate::error::Result;
use crate::packet::{self, AckPacket, DataPacket};
use crate::rtt::RttEstimator;
use crate::tracker::RetransmitTracker;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Sending,
    Recovery,
    Closing,
}

/// Serves one file to the first peer that asks for it.
pub struct FileSender<C: CongestionControl> {
    socket: UdpSocket,
    buffer: SendBuffer,
    tracker: RetransmitTracker,
    rtt: RttEstimator,
    congestion: C,
    phase: Phase,
    /// Next never-sent sequence number (the transmission high-water mark).
    next_seq: u32,
    last_cum_ack: Option<u32>,
    dup_ack_count: u32,
    /// Highest sequence sent when recovery was entered; a cumulative ACK
    /// beyond it ends recovery.
    recovery_anchor: u32,
}

impl<C: CongestionControl> FileSender<C> {
    pub async fn bind(addr: SocketAddr, data: Bytes, congestion: C) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("sender bound to {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buffer: SendBuffer::new(data),
            tracker: RetransmitTracker::new(),
            rtt: RttEstimator::new(),
            congestion,
            phase: Phase::Sending,
            next_seq: 0,
            last_cum_ack: None,
            dup_ack_count: 0,
            recovery_anchor: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for a transfer request, answers it, streams every segment, and
    /// closes the stream with the end-of-stream sentinel.
    pub async fn serve(mut self) -> Result<()> {
        let peer = self.wait_for_request().await?;
        self.socket
            .send_to(&DataPacket::ready().to_bytes(), peer)
            .await?;
        info!(
            "serving {} bytes in {} segments to {peer}",
            self.buffer.total_bytes(),
            self.buffer.total_segments()
        );
        self.transfer(peer).await?;
        self.close_stream(peer).await
    }

    async fn wait_for_request(&self) -> Result<SocketAddr> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            let received = timeout(REQUEST_POLL, self.socket.recv_from(&mut buf)).await;
            match received {
                Ok(recv) => {
                    let (len, peer) = recv?;
                    if len > 0 && buf[0] != 0 {
                        debug!("transfer request from {peer}");
                        return Ok(peer);
                    }
                }
                Err(_) => info!("waiting for a transfer request"),
            }
        }
    }

    async fn transfer(&mut self, peer: SocketAddr) -> Result<()> {
        let total = self.buffer.total_segments();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        while self.phase != Phase::Closing {
            let mut made_progress = false;

            // Admission: stream new segments while the window has room. In
            // recovery, admission additionally stops once the flight exceeds
            // the (deflated) window.
            while self.next_seq < total {
                let len = self.buffer.payload_len(self.next_seq);
                if !self.congestion.admit(self.tracker.in_flight(), len) {
                    break;
                }
                if self.phase == Phase::Recovery
                    && self.tracker.in_flight() > self.congestion.window()
                {
                    break;
                }
                self.send_segment(self.next_seq, peer).await?;
                self.next_seq += 1;
                made_progress = true;
            }

            if self.next_seq >= total && !self.tracker.has_unacked() {
                self.phase = Phase::Closing;
                break;
            }

            let wait = self.congestion.poll_timeout(self.rtt.rto());
            let received = timeout(wait, self.socket.recv_from(&mut buf)).await;
            match received {
                Ok(recv) => {
                    let (len, _from) = recv?;
                    match packet::parse::<AckPacket>(Bytes::copy_from_slice(&buf[..len])) {
                        Ok(ack) => self.handle_ack(ack, peer).await?,
                        Err(_) => trace!("discarding malformed datagram ({len} bytes)"),
                    }
                }
                Err(_) => {
                    // Timer sweep: everything past its RTO goes out again,
                    // and the window takes the severe reaction.
                    let now = Instant::now();
                    let expired = self.tracker.expired(now, self.rtt.rto());
                    if !expired.is_empty() {
                        warn!("{} segments past RTO, retransmitting", expired.len());
                        self.congestion.on_timeout(now);
                        for seq in expired {
                            self.send_segment(seq, peer).await?;
                        }
                        continue;
                    }
                    if !made_progress {
                        sleep(IDLE_YIELD).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_ack(&mut self, ack: AckPacket, peer: SocketAddr) -> Result<()> {
        let now = Instant::now();
        trace!("ack cum={} sacks={:?}", ack.cum_ack, ack.sacks);

        // Duplicate detection against the last cumulative value. A regressed
        // cumulative field is a protocol violation: log it and leave every
        // piece of cumulative state untouched.
        let mut cum_valid = true;
        match self.last_cum_ack {
            Some(last) if ack.cum_ack < last => {
                warn!("cumulative ACK regressed from {last} to {}", ack.cum_ack);
                cum_valid = false;
            }
            Some(last) if ack.cum_ack == last => {
                self.dup_ack_count += 1;
                trace!("duplicate ACK #{} for cum={}", self.dup_ack_count, ack.cum_ack);
            }
            _ => {
                if self.phase == Phase::Recovery && ack.cum_ack > self.recovery_anchor {
                    debug!("recovery complete at cum={}", ack.cum_ack);
                    self.phase = Phase::Sending;
                    self.congestion.on_recovery_exit(now);
                }
                self.last_cum_ack = Some(ack.cum_ack);
                self.dup_ack_count = 0;
            }
        }

        if self.dup_ack_count >= DUP_ACK_THRESHOLD
            && self.phase != Phase::Recovery
            && let Some(oldest) = self.tracker.oldest_unacked()
        {
            // Fast retransmit targets the oldest outstanding segment, not
            // the cumulative value: selective ACKs may have filled gaps
            // above the cumulative pointer already.
            debug!(
                "fast retransmit of segment {oldest} after {} duplicates",
                self.dup_ack_count
            );
            self.send_segment(oldest, peer).await?;
            self.phase = Phase::Recovery;
            self.recovery_anchor = self.next_seq.saturating_sub(1);
            self.congestion.on_fast_retransmit(now);
            self.dup_ack_count = 0;
        } else if self.phase == Phase::Recovery && self.dup_ack_count > 0 {
            // Window inflation: one MSS per duplicate while the loss drains.
            self.congestion.on_duplicate_ack();
            if self.dup_ack_count % RECOVERY_SWEEP_EVERY == 0 {
                let expired = self.tracker.expired(now, self.rtt.rto());
                if !expired.is_empty() {
                    warn!(
                        "recovery stalled, retransmitting {} expired segments",
                        expired.len()
                    );
                    for seq in expired {
                        self.send_segment(seq, peer).await?;
                    }
                }
            }
        }

        // Release everything the ACK covers: the cumulative prefix plus any
        // selective ranges, clipped to the segment space.
        let mut newly_acked = if cum_valid {
            self.tracker.unacked_below(ack.cum_ack)
        } else {
            Vec::new()
        };
        let total = self.buffer.total_segments();
        if total > 0 {
            for range in &ack.sacks {
                let end = range.end.min(total - 1);
                if range.start > end {
                    continue;
                }
                newly_acked.extend(self.tracker.unacked_in(range.start, end));
            }
        }
        newly_acked.sort_unstable();
        newly_acked.dedup();
        for seq in newly_acked {
            if let Some(sample) = self.tracker.record_ack(seq, now) {
                self.rtt.on_sample(sample);
            }
            trace!(
                "segment {seq} acknowledged, {} bytes in flight",
                self.tracker.in_flight()
            );
        }

        if self.phase != Phase::Recovery {
            self.congestion.on_ack_progress(now);
        }
        Ok(())
    }

    async fn send_segment(&mut self, seq: u32, peer: SocketAddr) -> Result<()> {
        let payload = self.buffer.payload(seq);
        let len = payload.len();
        self.socket
            .send_to(&DataPacket::new(seq, payload).to_bytes(), peer)
            .await?;
        self.tracker.record_send(seq, len, Instant::now());
        trace!(
            "sent segment {seq} ({len} bytes, {} in flight, window {})",
            self.tracker.in_flight(),
            self.congestion.window()
        );
        Ok(())
    }

    /// Pushes the end-of-stream sentinel until the receiver acknowledges past
    /// it. Exhausting the attempt budget is logged but not fatal: every data
    /// segment has already been acknowledged by this point.
    async fn close_stream(&mut self, peer: SocketAddr) -> Result<()> {
        let eof_seq = self.buffer.total_segments();
        let eof = DataPacket::eof(eof_seq).to_bytes();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        for attempt in 1..=MAX_EOF_ATTEMPTS {
            self.socket.send_to(&eof, peer).await?;
            trace!("sent end-of-stream marker (attempt {attempt})");
            let received = timeout(self.rtt.rto(), self.socket.recv_from(&mut buf)).await;
            match received {
                Ok(recv) => {
                    let (len, _from) = recv?;
                    if let Ok(ack) = packet::parse::<AckPacket>(Bytes::copy_from_slice(&buf[..len]))
                        && ack.cum_ack > eof_seq
                    {
                        info!(
                            "transfer complete: {} bytes in {} segments",
                            self.buffer.total_bytes(),
                            eof_seq
                        );
                        return Ok(());
                    }
                    // A stale data-phase ACK: resend the sentinel right away.
                }
                Err(_) => continue,
            }
        }
        warn!("end of stream not acknowledged after {MAX_EOF_ATTEMPTS} attempts, assuming delivery");
        Ok(())
    }
}

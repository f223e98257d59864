//! Admission policies for the send loop.
//!
//! Two interchangeable regimes: a static byte window that never reacts to
//! loss, and a CUBIC window driven by the cubic growth law with a halving
//! reaction to triple-duplicate ACKs and a floor reset on timer expiry.

use crate::consts::{CUBIC_POLL_SLACK, DATA_SIZE, FIXED_WINDOW_POLL};
use log::{debug, trace};
use std::time::{Duration, Instant};

// CUBIC tuning. RFC 8312 uses C = 0.4; this stack runs the far steeper
// C = 10000 with byte-denominated windows.
const CUBIC_C: f64 = 10000.0;
const CUBIC_BETA: f64 = 0.3;
const CUBIC_DECREASE: f64 = 0.5;
const INITIAL_WMAX: f64 = 200.0 * DATA_SIZE as f64;
const CWND_FLOOR: f64 = 10.0 * DATA_SIZE as f64;
const CWND_CEILING: f64 = 10_000.0 * DATA_SIZE as f64;

/// Window policy consulted by the send loop.
///
/// The loop owns the recovery state machine; it only routes the matching
/// signal here. Growth is never requested while in recovery, and duplicate
/// ACK inflation is only requested while in recovery.
pub trait CongestionControl: Send + Sync {
    /// Current window in bytes.
    fn window(&self) -> usize;

    /// Whether one more segment of `next_len` bytes may enter the network.
    fn admit(&self, in_flight: usize, next_len: usize) -> bool {
        in_flight + next_len <= self.window()
    }

    /// How long the send loop waits for an ACK before sweeping timers.
    fn poll_timeout(&self, rto: Duration) -> Duration;

    /// An acknowledgement was processed outside recovery.
    fn on_ack_progress(&mut self, _now: Instant) {}

    /// A duplicate ACK arrived while in recovery.
    fn on_duplicate_ack(&mut self) {}

    /// Triple-duplicate loss signal.
    fn on_fast_retransmit(&mut self, _now: Instant) {}

    /// Retransmission-timer loss signal.
    fn on_timeout(&mut self, _now: Instant) {}

    /// The loss that opened recovery has been cumulatively acknowledged.
    fn on_recovery_exit(&mut self, _now: Instant) {}
}

/// Static byte window: admission is the only control, loss handling is left
/// entirely to retransmission.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow {
    window: usize,
}

impl FixedWindow {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl CongestionControl for FixedWindow {
    fn window(&self) -> usize {
        self.window
    }

    fn poll_timeout(&self, _rto: Duration) -> Duration {
        FIXED_WINDOW_POLL
    }
}

/// Byte-based CUBIC congestion window.
#[derive(Debug)]
pub struct Cubic {
    cwnd: f64,
    w_max: f64,
    epoch_start: Option<Instant>,
    k: f64,
}

impl Cubic {
    pub fn new() -> Self {
        Self {
            cwnd: DATA_SIZE as f64,
            w_max: INITIAL_WMAX,
            epoch_start: None,
            k: 0.0,
        }
    }
}

impl Default for Cubic {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionControl for Cubic {
    fn window(&self) -> usize {
        self.cwnd as usize
    }

    fn poll_timeout(&self, rto: Duration) -> Duration {
        rto + CUBIC_POLL_SLACK
    }

    fn on_ack_progress(&mut self, now: Instant) {
        let Some(epoch_start) = self.epoch_start else {
            // First ACK of a growth epoch fixes the plateau time; the window
            // itself moves from the next ACK on.
            self.epoch_start = Some(now);
            self.k = ((self.w_max * CUBIC_BETA) / CUBIC_C).cbrt();
            trace!("cubic epoch opened: w_max={:.0} k={:.3}s", self.w_max, self.k);
            return;
        };
        let t = now.duration_since(epoch_start).as_secs_f64();
        let w = CUBIC_C * (t - self.k).powi(3) + self.w_max;
        self.cwnd = w.clamp(CWND_FLOOR, CWND_CEILING);
    }

    fn on_duplicate_ack(&mut self) {
        self.cwnd = (self.cwnd + DATA_SIZE as f64).min(CWND_CEILING);
    }

    fn on_fast_retransmit(&mut self, _now: Instant) {
        self.w_max = self.cwnd;
        self.cwnd *= CUBIC_DECREASE;
        self.epoch_start = None;
        debug!(
            "cubic halved on fast retransmit: cwnd={:.0} w_max={:.0}",
            self.cwnd, self.w_max
        );
    }

    fn on_timeout(&mut self, _now: Instant) {
        self.w_max = self.cwnd / 2.0;
        self.cwnd = CWND_FLOOR;
        self.epoch_start = None;
        debug!(
            "cubic collapsed on timeout: cwnd={:.0} w_max={:.0}",
            self.cwnd, self.w_max
        );
    }
}

use crate::consts::{INITIAL_RTO, MAX_RTO, MIN_RTO};
use std::time::Duration;

// Smoothing factors from the Jacobson/Karels estimator.
const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

/// Smoothed round-trip tracker producing the retransmission timeout.
///
/// Callers must only feed samples measured from segments that were never
/// retransmitted since their last acknowledgement; a sample spanning a
/// retransmission is ambiguous and would skew the estimate.
#[derive(Debug)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            srtt: None,
            rttvar: Duration::ZERO,
            rto: INITIAL_RTO,
        }
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    pub fn on_sample(&mut self, sample: Duration) {
        let srtt = match self.srtt {
            None => {
                self.rttvar = sample / 2;
                sample
            }
            Some(prev) => {
                let sample_s = sample.as_secs_f64();
                let prev_s = prev.as_secs_f64();
                let deviation = (sample_s - prev_s).abs();
                self.rttvar = Duration::from_secs_f64(
                    (1.0 - BETA) * self.rttvar.as_secs_f64() + BETA * deviation,
                );
                Duration::from_secs_f64((1.0 - ALPHA) * prev_s + ALPHA * sample_s)
            }
        };
        self.srtt = Some(srtt);
        self.rto = (srtt + self.rttvar * 4).clamp(MIN_RTO, MAX_RTO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Duration, b: Duration) -> bool {
        (a.as_secs_f64() - b.as_secs_f64()).abs() < 1e-6
    }

    #[test]
    fn initial_rto_is_one_second() {
        assert_eq!(RttEstimator::new().rto(), Duration::from_secs(1));
    }

    #[test]
    fn first_sample_seeds_both_estimates() {
        let mut est = RttEstimator::new();
        est.on_sample(Duration::from_millis(200));
        assert_eq!(est.srtt(), Some(Duration::from_millis(200)));
        // RTO = SRTT + 4 * (SRTT / 2)
        assert!(close(est.rto(), Duration::from_millis(600)));
    }

    #[test]
    fn later_samples_follow_the_ewma() {
        let mut est = RttEstimator::new();
        est.on_sample(Duration::from_millis(100));
        est.on_sample(Duration::from_millis(300));

        // RTTVAR = 0.75 * 50ms + 0.25 * |300 - 100|ms = 87.5ms
        // SRTT   = 0.875 * 100ms + 0.125 * 300ms = 125ms
        assert!(close(est.srtt().unwrap(), Duration::from_micros(125_000)));
        assert!(close(est.rto(), Duration::from_micros(475_000)));
    }

    #[test]
    fn rto_clamps_at_the_floor() {
        let mut est = RttEstimator::new();
        est.on_sample(Duration::from_millis(1));
        assert_eq!(est.rto(), MIN_RTO);
    }

    #[test]
    fn rto_clamps_at_the_ceiling() {
        let mut est = RttEstimator::new();
        est.on_sample(Duration::from_secs(10));
        assert_eq!(est.rto(), MAX_RTO);
    }
}

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::utils::timing::TimingStats;

pub const DEFAULT_DETECTION_INTERVAL_MS: u64 = 66;
pub const DEFAULT_WATCHDOG_MS: u64 = 3500;

/// Weight of the newest sample in the latency average.
const LATENCY_ALPHA: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Minimum time between two submissions.
    pub min_interval: Duration,
    /// A request older than this is presumed lost and the busy flag is cleared.
    pub watchdog: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_DETECTION_INTERVAL_MS),
            watchdog: Duration::from_millis(DEFAULT_WATCHDOG_MS),
        }
    }
}

/// Submitter-side flow control: at most one detection request in flight,
/// a minimum interval between requests and a watchdog for lost replies.
pub struct DetectionScheduler {
    config: SchedulerConfig,
    in_flight: Option<(u64, Instant)>,
    last_submit: Option<Instant>,
    last_applied: Option<u64>,
    latency_ms: f32,
    completed: u64,
    watchdog_resets: u64,
    stats: TimingStats,
}

impl DetectionScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            in_flight: None,
            last_submit: None,
            last_applied: None,
            latency_ms: 0.0,
            completed: 0,
            watchdog_resets: 0,
            stats: TimingStats::new("Detection round trip"),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn can_submit(&self, now: Instant) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        match self.last_submit {
            Some(last) => now.saturating_duration_since(last) >= self.config.min_interval,
            None => true,
        }
    }

    pub fn mark_submitted(&mut self, seq: u64, now: Instant) {
        self.in_flight = Some((seq, now));
        self.last_submit = Some(now);
    }

    /// Record a reply. Returns `false` for replies that are older than one
    /// already applied (late answers after a watchdog reset).
    pub fn accept(&mut self, seq: u64, now: Instant) -> bool {
        if let Some((pending, submitted)) = self.in_flight {
            if pending == seq {
                self.in_flight = None;
                let round_trip = now.saturating_duration_since(submitted);
                let ms = round_trip.as_secs_f32() * 1000.0;
                self.latency_ms = if self.completed == 0 {
                    ms
                } else {
                    self.latency_ms + (ms - self.latency_ms) * LATENCY_ALPHA
                };
                self.stats.add_measurement(round_trip);
            }
        }

        if self.last_applied.is_some_and(|last| seq <= last) {
            debug!("Ignoring stale detection reply #{}", seq);
            return false;
        }
        self.last_applied = Some(seq);
        self.completed += 1;
        true
    }

    /// Clear a busy flag held longer than the watchdog period. Returns `true`
    /// when a reset happened.
    pub fn check_watchdog(&mut self, now: Instant) -> bool {
        match self.in_flight {
            Some((seq, submitted)) if now.saturating_duration_since(submitted) >= self.config.watchdog => {
                warn!(
                    "Detection request #{} unanswered for {:?}, clearing busy flag",
                    seq,
                    now.saturating_duration_since(submitted)
                );
                self.in_flight = None;
                self.watchdog_resets += 1;
                true
            }
            _ => false,
        }
    }

    pub fn latency_ms(&self) -> f32 {
        self.latency_ms
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn watchdog_resets(&self) -> u64 {
        self.watchdog_resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> DetectionScheduler {
        DetectionScheduler::new(SchedulerConfig {
            min_interval: Duration::from_millis(50),
            watchdog: Duration::from_millis(3000),
        })
    }

    #[test]
    fn test_single_request_in_flight() {
        let mut s = scheduler();
        let t0 = Instant::now();
        assert!(s.can_submit(t0));
        s.mark_submitted(1, t0);
        assert!(!s.can_submit(t0 + Duration::from_millis(500)));

        assert!(s.accept(1, t0 + Duration::from_millis(120)));
        assert!(!s.is_busy());
        assert!((s.latency_ms() - 120.0).abs() < 1.0);
        assert!(s.can_submit(t0 + Duration::from_millis(121)));
    }

    #[test]
    fn test_min_interval() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.mark_submitted(1, t0);
        s.accept(1, t0 + Duration::from_millis(10));
        assert!(!s.can_submit(t0 + Duration::from_millis(20)));
        assert!(s.can_submit(t0 + Duration::from_millis(50)));
    }

    #[test]
    fn test_watchdog_clears_lost_request() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.mark_submitted(1, t0);
        assert!(!s.check_watchdog(t0 + Duration::from_millis(2999)));
        assert!(s.check_watchdog(t0 + Duration::from_millis(3000)));
        assert!(s.can_submit(t0 + Duration::from_millis(3000)));
        assert_eq!(s.watchdog_resets(), 1);

        // A newer request completes, then the lost one finally answers
        s.mark_submitted(2, t0 + Duration::from_millis(3000));
        assert!(s.accept(2, t0 + Duration::from_millis(3100)));
        assert!(!s.accept(1, t0 + Duration::from_millis(3200)));
        assert_eq!(s.completed(), 1);
    }
}

use std::time::{Duration, Instant};
use log::{debug, trace};

/// Samples between the averaged `debug!` summaries of a [`TimingStats`].
pub const SUMMARY_EVERY: u32 = 300;

pub struct TimingStats {
    pub name: String,
    pub total_time: Duration,
    pub count: u32,
}

impl TimingStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_time: Duration::from_secs(0),
            count: 0,
        }
    }

    pub fn add_measurement(&mut self, duration: Duration) {
        self.total_time += duration;
        self.count += 1;

        let avg_ms = self.average_ms();
        trace!("{} - Current: {:.2}ms, Avg: {:.2}ms, Count: {}",
            self.name,
            duration.as_secs_f64() * 1000.0,
            avg_ms,
            self.count
        );
        if self.summary_due() {
            debug!("{} - Avg: {:.2}ms over {} samples", self.name, avg_ms, self.count);
        }
    }

    /// Whether the latest sample completes a summary interval.
    pub fn summary_due(&self) -> bool {
        self.count > 0 && self.count % SUMMARY_EVERY == 0
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_time.as_secs_f64() * 1000.0) / self.count as f64
        }
    }
}

pub struct ScopedTimer<'a> {
    start: Instant,
    stats: &'a mut TimingStats,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(stats: &'a mut TimingStats) -> Self {
        Self {
            start: Instant::now(),
            stats,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.stats.add_measurement(duration);
    }
}

/// Per-frame clock for the render loop: clamped frame delta and a smoothed
/// frame rate.
pub struct FrameClock {
    last: Option<Instant>,
    max_dt: Duration,
    fps: f32,
    frames: u64,
}

impl FrameClock {
    pub fn new(max_dt: Duration) -> Self {
        Self {
            last: None,
            max_dt,
            fps: 0.0,
            frames: 0,
        }
    }

    /// Seconds since the previous tick, clamped to `max_dt`. The first tick
    /// returns zero.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let raw = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        self.frames += 1;

        if raw > Duration::ZERO {
            let instant_fps = 1.0 / raw.as_secs_f32();
            self.fps = if self.fps == 0.0 {
                instant_fps
            } else {
                self.fps * 0.9 + instant_fps * 0.1
            };
        }
        raw.min(self.max_dt).as_secs_f32()
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_stats_average() {
        let mut stats = TimingStats::new("test");
        stats.add_measurement(Duration::from_millis(10));
        stats.add_measurement(Duration::from_millis(30));
        assert!((stats.average_ms() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_summary_only_every_interval() {
        let mut stats = TimingStats::new("render");
        let mut summaries = 0;
        for _ in 0..SUMMARY_EVERY * 2 {
            stats.add_measurement(Duration::from_micros(500));
            if stats.summary_due() {
                summaries += 1;
            }
        }
        assert_eq!(summaries, 2);

        // A second of frames at 60Hz stays quiet
        let mut stats = TimingStats::new("render");
        for _ in 0..60 {
            stats.add_measurement(Duration::from_micros(500));
            assert!(!stats.summary_due());
        }
    }

    #[test]
    fn test_frame_clock_clamps_stalls() {
        let mut clock = FrameClock::new(Duration::from_millis(34));
        let t0 = Instant::now();
        assert_eq!(clock.tick(t0), 0.0);

        let dt = clock.tick(t0 + Duration::from_millis(16));
        assert!((dt - 0.016).abs() < 1e-4);
        assert!((clock.fps() - 62.5).abs() < 0.5);

        let dt = clock.tick(t0 + Duration::from_millis(2016));
        assert!((dt - 0.034).abs() < 1e-4);
        assert_eq!(clock.frames(), 3);
    }
}

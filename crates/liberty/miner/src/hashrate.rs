//! Hash-rate meter
//!
//! Exponentially weighted moving average of attempts per second over a
//! one-minute window, advanced in five second ticks. Ticks are applied lazily
//! whenever the meter is marked or read.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Interval between EWMA updates
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Averaging window in seconds
const WINDOW_SECS: f64 = 60.0;

/// Attempts-per-second meter shared by search threads
#[derive(Debug)]
pub struct Meter {
    state: Mutex<MeterState>,
}

#[derive(Debug)]
struct MeterState {
    /// Attempts marked since the last tick
    uncounted: u64,
    /// Attempts marked since creation
    total: u64,
    /// Current rate in attempts per second
    rate: f64,
    initialized: bool,
    last_tick: Instant,
}

impl Meter {
    /// Create an empty meter
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    fn new_at(now: Instant) -> Self {
        Self {
            state: Mutex::new(MeterState {
                uncounted: 0,
                total: 0,
                rate: 0.0,
                initialized: false,
                last_tick: now,
            }),
        }
    }

    /// Record `attempts` hash evaluations
    pub fn mark(&self, attempts: u64) {
        self.mark_at(attempts, Instant::now());
    }

    fn mark_at(&self, attempts: u64, now: Instant) {
        let mut state = self.state.lock();
        state.tick_to(now);
        state.uncounted += attempts;
        state.total += attempts;
    }

    /// One-minute moving average in attempts per second
    pub fn rate1(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.tick_to(now);
        state.rate
    }

    /// Total attempts recorded
    pub fn count(&self) -> u64 {
        self.state.lock().total
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterState {
    fn tick_to(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        if ticks == 0 {
            return;
        }

        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / WINDOW_SECS).exp();
        let instant = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.initialized = true;
        }
        // Remaining ticks saw no attempts, only decay.
        let idle = (ticks - 1).min(i32::MAX as u64) as i32;
        self.rate *= (1.0 - alpha).powi(idle);

        self.last_tick = match u32::try_from(ticks) {
            Ok(ticks) => self.last_tick + TICK_INTERVAL * ticks,
            Err(_) => now,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_before_first_tick() {
        let start = Instant::now();
        let meter = Meter::new_at(start);
        meter.mark_at(1_000, start);

        assert_eq!(meter.rate_at(start + Duration::from_secs(1)), 0.0);
        assert_eq!(meter.count(), 1_000);
    }

    #[test]
    fn test_first_tick_sets_rate() {
        let start = Instant::now();
        let meter = Meter::new_at(start);
        meter.mark_at(500, start + Duration::from_secs(1));

        let rate = meter.rate_at(start + TICK_INTERVAL);
        assert!((rate - 100.0).abs() < 1e-9, "rate {rate}");
    }

    #[test]
    fn test_rate_decays_when_idle() {
        let start = Instant::now();
        let meter = Meter::new_at(start);
        meter.mark_at(500, start);

        let first = meter.rate_at(start + TICK_INTERVAL);
        let later = meter.rate_at(start + TICK_INTERVAL * 2);
        let much_later = meter.rate_at(start + Duration::from_secs(600));

        assert!(later < first);
        assert!(much_later < later);
        assert!(much_later < 1.0);
    }

    #[test]
    fn test_resumes_after_very_long_idle() {
        let start = Instant::now();
        let meter = Meter::new_at(start);
        meter.mark_at(500, start);

        let resumed = start + TICK_INTERVAL * u32::MAX + TICK_INTERVAL * 2;
        assert!(meter.rate_at(resumed) < 1e-9);

        meter.mark_at(500, resumed);
        let rate = meter.rate_at(resumed + TICK_INTERVAL);
        assert!(rate > 1.0 && rate < 100.0, "rate {rate}");
    }

    #[test]
    fn test_rate_tracks_steady_load() {
        let start = Instant::now();
        let meter = Meter::new_at(start);
        for tick in 0..120u32 {
            meter.mark_at(1_000, start + TICK_INTERVAL * tick);
        }

        let rate = meter.rate_at(start + TICK_INTERVAL * 120);
        assert!((rate - 200.0).abs() < 1.0, "rate {rate}");
    }
}

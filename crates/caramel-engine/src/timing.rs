//! Per-domain latency calibration.
//!
//! Each retailer reacts to a coupon submission at its own pace: some
//! recalculate client-side in a few milliseconds, others round-trip a slow
//! API. The tracker keeps a running mean of observed reaction times per
//! domain and scales every subsequent wait on that domain.
//!
//! | Running mean | Suggested timeout            |
//! |--------------|------------------------------|
//! | no samples   | `base`                       |
//! | < 800 ms     | `max(800 ms, base × 0.6)`    |
//! | > 2000 ms    | `min(4000 ms, base × 1.5)`   |
//! | otherwise    | `base`                       |

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const FAST_BELOW_MS: f64 = 800.0;
const SLOW_ABOVE_MS: f64 = 2000.0;
const FAST_FLOOR: Duration = Duration::from_millis(800);
const SLOW_CEILING: Duration = Duration::from_millis(4000);

/// How quickly a domain has been reacting so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Unknown,
    Fast,
    Normal,
    Slow,
}

/// Running latency statistics for one domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainPerformance {
    pub avg_response_ms: f64,
    pub count: u64,
}

impl Default for DomainPerformance {
    fn default() -> Self {
        Self {
            avg_response_ms: 1500.0,
            count: 0,
        }
    }
}

impl DomainPerformance {
    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, sample_ms: f64) {
        let count = self.count as f64;
        self.avg_response_ms = (self.avg_response_ms * count + sample_ms) / (count + 1.0);
        self.count += 1;
    }

    fn pace(&self) -> Pace {
        if self.count == 0 {
            Pace::Unknown
        } else if self.avg_response_ms < FAST_BELOW_MS {
            Pace::Fast
        } else if self.avg_response_ms > SLOW_ABOVE_MS {
            Pace::Slow
        } else {
            Pace::Normal
        }
    }
}

/// Latency model consulted before every wait and fed after every wait.
pub trait LatencyModel {
    /// Timeout to use on `domain` for a wait whose nominal bound is `base`.
    fn estimate(&self, domain: &str, base: Duration) -> Duration;

    fn record(&self, domain: &str, observed: Duration);

    fn pace(&self, domain: &str) -> Pace;
}

/// Session-scoped [`LatencyModel`] backed by a per-domain running mean.
///
/// Entries are created on the first sample and never removed; nothing is
/// persisted.
#[derive(Debug, Default)]
pub struct AdaptiveTiming {
    domains: Mutex<HashMap<String, DomainPerformance>>,
}

impl AdaptiveTiming {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current statistics for `domain`, if any sample has been recorded.
    #[must_use]
    pub fn snapshot(&self, domain: &str) -> Option<DomainPerformance> {
        self.lock().get(domain).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DomainPerformance>> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LatencyModel for AdaptiveTiming {
    fn estimate(&self, domain: &str, base: Duration) -> Duration {
        match self.pace(domain) {
            Pace::Unknown | Pace::Normal => base,
            // × 0.6 and × 1.5, kept in integer nanoseconds.
            Pace::Fast => (base * 3 / 5).max(FAST_FLOOR),
            Pace::Slow => (base * 3 / 2).min(SLOW_CEILING),
        }
    }

    fn record(&self, domain: &str, observed: Duration) {
        let sample_ms = observed.as_secs_f64() * 1000.0;
        let mut domains = self.lock();
        let perf = domains.entry(domain.to_owned()).or_default();
        perf.record(sample_ms);
        tracing::trace!(
            domain,
            sample_ms,
            avg_ms = perf.avg_response_ms,
            count = perf.count,
            "recorded response time"
        );
    }

    fn pace(&self, domain: &str) -> Pace {
        self.lock()
            .get(domain)
            .map_or(Pace::Unknown, DomainPerformance::pace)
    }
}

/// A latency model bound to one domain, handed to waiters so they can size
/// their timeout and report how long they took.
#[derive(Clone, Copy)]
pub struct Calibration<'a> {
    model: &'a dyn LatencyModel,
    domain: &'a str,
}

impl<'a> Calibration<'a> {
    #[must_use]
    pub fn new(model: &'a dyn LatencyModel, domain: &'a str) -> Self {
        Self { model, domain }
    }

    #[must_use]
    pub fn domain(&self) -> &'a str {
        self.domain
    }

    #[must_use]
    pub fn timeout(&self, base: Duration) -> Duration {
        self.model.estimate(self.domain, base)
    }

    pub fn record(&self, elapsed: Duration) {
        self.model.record(self.domain, elapsed);
    }

    #[must_use]
    pub fn pace(&self) -> Pace {
        self.model.pace(self.domain)
    }
}

impl std::fmt::Debug for Calibration<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calibration")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn tracker_with(domain: &str, samples: &[u64]) -> AdaptiveTiming {
        let tracker = AdaptiveTiming::new();
        for &s in samples {
            tracker.record(domain, ms(s));
        }
        tracker
    }

    #[test]
    fn unknown_domain_keeps_base_timeout() {
        let tracker = AdaptiveTiming::new();
        for base in [120, 1500, 3500, 10_000] {
            assert_eq!(tracker.estimate("never-seen.com", ms(base)), ms(base));
        }
        assert_eq!(tracker.pace("never-seen.com"), Pace::Unknown);
    }

    #[test]
    fn running_average_equals_arithmetic_mean() {
        let samples = [100u64, 2500, 700, 1300, 4200, 35];
        let tracker = tracker_with("shop.com", &samples);
        let snapshot = tracker.snapshot("shop.com").unwrap();
        #[allow(clippy::cast_precision_loss)]
        let mean = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
        assert_eq!(snapshot.count, samples.len() as u64);
        assert!(
            (snapshot.avg_response_ms - mean).abs() < 1e-9,
            "avg {} != mean {mean}",
            snapshot.avg_response_ms
        );
    }

    #[test]
    fn mean_does_not_depend_on_sample_order() {
        let forward = tracker_with("shop.com", &[300, 900, 2700]);
        let reverse = tracker_with("shop.com", &[2700, 900, 300]);
        let a = forward.snapshot("shop.com").unwrap().avg_response_ms;
        let b = reverse.snapshot("shop.com").unwrap().avg_response_ms;
        assert!((a - b).abs() < 1e-9);
        assert!((a - 1300.0).abs() < 1e-9);
    }

    #[test]
    fn first_sample_replaces_default_average() {
        let tracker = tracker_with("shop.com", &[420]);
        let snapshot = tracker.snapshot("shop.com").unwrap();
        assert!((snapshot.avg_response_ms - 420.0).abs() < 1e-9);
        assert_eq!(snapshot.count, 1);
    }

    #[test]
    fn fast_domain_shrinks_timeout_with_floor() {
        let tracker = tracker_with("fast.com", &[300]);
        assert_eq!(tracker.pace("fast.com"), Pace::Fast);
        assert_eq!(tracker.estimate("fast.com", ms(3500)), ms(2100));
        assert_eq!(tracker.estimate("fast.com", ms(1000)), ms(800));
        assert_eq!(tracker.estimate("fast.com", ms(120)), ms(800));
    }

    #[test]
    fn slow_domain_extends_timeout_with_ceiling() {
        let tracker = tracker_with("slow.com", &[2600]);
        assert_eq!(tracker.pace("slow.com"), Pace::Slow);
        assert_eq!(tracker.estimate("slow.com", ms(2000)), ms(3000));
        assert_eq!(tracker.estimate("slow.com", ms(3500)), ms(4000));
    }

    #[test]
    fn normal_domain_keeps_base() {
        let tracker = tracker_with("steady.com", &[800, 2000]);
        assert_eq!(tracker.pace("steady.com"), Pace::Normal);
        assert_eq!(tracker.estimate("steady.com", ms(3500)), ms(3500));
    }

    #[test]
    fn domains_are_tracked_independently() {
        let tracker = tracker_with("fast.com", &[100]);
        tracker.record("slow.com", ms(5000));
        assert_eq!(tracker.pace("fast.com"), Pace::Fast);
        assert_eq!(tracker.pace("slow.com"), Pace::Slow);
    }

    #[test]
    fn calibration_delegates_to_model() {
        let tracker = AdaptiveTiming::new();
        let calibration = Calibration::new(&tracker, "shop.com");
        assert_eq!(calibration.timeout(ms(1500)), ms(1500));
        calibration.record(ms(250));
        assert_eq!(calibration.pace(), Pace::Fast);
        assert_eq!(tracker.snapshot("shop.com").unwrap().count, 1);
    }
}

//! Position sources feeding the location broadcaster
//!
//! Two interchangeable variants, selected by construction and never
//! inferred at runtime: a sensor-backed source fed by a real GPS receiver,
//! and a synthetic source for environments without one. Tests force either
//! path deterministically.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, interval, timeout};
use tracing::warn;

use bus_core::GeoPoint;

/// Bounded wait for one sensor sample
pub const SENSOR_SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Oldest cached sensor fix still worth publishing
pub const SENSOR_MAX_FIX_AGE: Duration = Duration::from_secs(5);
/// Cadence of the synthetic walk
pub const SYNTHETIC_PERIOD: Duration = Duration::from_millis(2000);
/// Jitter applied per synthetic step, in degrees
const SYNTHETIC_JITTER_DEG: f64 = 0.0005;

/// One timestamped coordinate sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Ground speed in metres per second, when the source reports one
    pub speed_mps: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    /// Fix with no speed reading, stamped now
    pub fn new(point: GeoPoint) -> Self {
        Self {
            point,
            speed_mps: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }
}

/// Source of position fixes for one tracking session
#[async_trait]
pub trait PositionSource: Send + 'static {
    /// Wait for the next fix. `None` means the source is exhausted and
    /// the session should end.
    async fn next_fix(&mut self) -> Option<PositionFix>;
}

// ============================================================================
// SENSOR-BACKED SOURCE
// ============================================================================

/// Fixes from a real GPS receiver, delivered over a channel by whatever
/// platform adapter owns the device
pub struct SensorPositionSource {
    samples: mpsc::Receiver<PositionFix>,
    sample_timeout: Duration,
    max_fix_age: Duration,
}

impl SensorPositionSource {
    pub fn new(samples: mpsc::Receiver<PositionFix>) -> Self {
        Self::with_limits(samples, SENSOR_SAMPLE_TIMEOUT, SENSOR_MAX_FIX_AGE)
    }

    pub fn with_limits(
        samples: mpsc::Receiver<PositionFix>,
        sample_timeout: Duration,
        max_fix_age: Duration,
    ) -> Self {
        Self {
            samples,
            sample_timeout,
            max_fix_age,
        }
    }
}

#[async_trait]
impl PositionSource for SensorPositionSource {
    async fn next_fix(&mut self) -> Option<PositionFix> {
        let max_age = chrono::Duration::from_std(self.max_fix_age)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));

        loop {
            match timeout(self.sample_timeout, self.samples.recv()).await {
                Ok(Some(fix)) => {
                    if Utc::now().signed_duration_since(fix.timestamp) <= max_age {
                        return Some(fix);
                    }
                    // cached sample too old; wait for a fresher one
                }
                Ok(None) => return None,
                Err(_) => warn!("no position fix within {:?}", self.sample_timeout),
            }
        }
    }
}

// ============================================================================
// SYNTHETIC SOURCE
// ============================================================================

/// Jittered walk around an origin on a fixed cadence, for demos and
/// environments without a sensor. Reports no speed; the broadcaster's
/// simulate gate decides whether a placeholder is filled in.
pub struct SyntheticPositionSource {
    current: GeoPoint,
    ticker: Interval,
    rng: StdRng,
}

impl SyntheticPositionSource {
    pub fn new(origin: GeoPoint) -> Self {
        Self::with_period(origin, SYNTHETIC_PERIOD)
    }

    pub fn with_period(origin: GeoPoint, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            current: origin,
            ticker,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic walk for tests
    pub fn with_seed(origin: GeoPoint, seed: u64) -> Self {
        let mut source = Self::new(origin);
        source.rng = StdRng::seed_from_u64(seed);
        source
    }
}

#[async_trait]
impl PositionSource for SyntheticPositionSource {
    async fn next_fix(&mut self) -> Option<PositionFix> {
        self.ticker.tick().await;

        let delta_lat = self.rng.random_range(-SYNTHETIC_JITTER_DEG..SYNTHETIC_JITTER_DEG);
        let delta_lng = self.rng.random_range(-SYNTHETIC_JITTER_DEG..SYNTHETIC_JITTER_DEG);
        self.current = GeoPoint::new(self.current.lat + delta_lat, self.current.lng + delta_lng);

        Some(PositionFix::new(self.current))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn main_gate() -> GeoPoint {
        GeoPoint::new(11.0168, 76.9558)
    }

    #[tokio::test]
    async fn test_sensor_source_passes_fresh_fix_through() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = SensorPositionSource::new(rx);

        let fix = PositionFix::new(main_gate()).with_speed(6.5);
        tx.send(fix).await.unwrap();

        let received = source.next_fix().await.unwrap();
        assert_eq!(received.point, fix.point);
        assert_eq!(received.speed_mps, Some(6.5));
    }

    #[tokio::test]
    async fn test_sensor_source_discards_stale_fixes() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = SensorPositionSource::new(rx);

        let stale = PositionFix {
            point: main_gate(),
            speed_mps: None,
            timestamp: Utc::now() - chrono::Duration::seconds(60),
        };
        let fresh = PositionFix::new(GeoPoint::new(11.0178, 76.9568));
        tx.send(stale).await.unwrap();
        tx.send(fresh).await.unwrap();

        let received = source.next_fix().await.unwrap();
        assert_eq!(received.point, fresh.point);
    }

    #[tokio::test]
    async fn test_sensor_source_ends_when_receiver_closes() {
        let (tx, rx) = mpsc::channel::<PositionFix>(8);
        let mut source = SensorPositionSource::new(rx);
        drop(tx);

        assert!(source.next_fix().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_source_keeps_waiting_past_the_bounded_wait() {
        let (tx, rx) = mpsc::channel(8);
        let mut source =
            SensorPositionSource::with_limits(rx, Duration::from_secs(10), SENSOR_MAX_FIX_AGE);

        let feeder = tokio::spawn(async move {
            // arrives after one full timed-out wait
            tokio::time::sleep(Duration::from_secs(15)).await;
            let fix = PositionFix::new(GeoPoint::new(11.0168, 76.9558));
            tx.send(fix).await.unwrap();
        });

        assert!(source.next_fix().await.is_some());
        feeder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_source_jitters_within_bounds() {
        let mut source = SyntheticPositionSource::with_seed(main_gate(), 7);

        let first = source.next_fix().await.unwrap();
        let second = source.next_fix().await.unwrap();

        assert!((second.point.lat - first.point.lat).abs() < SYNTHETIC_JITTER_DEG);
        assert!((second.point.lng - first.point.lng).abs() < SYNTHETIC_JITTER_DEG);
        assert!(first.speed_mps.is_none());
        assert!(second.speed_mps.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_source_is_deterministic_for_a_seed() {
        let mut a = SyntheticPositionSource::with_seed(main_gate(), 42);
        let mut b = SyntheticPositionSource::with_seed(main_gate(), 42);

        for _ in 0..3 {
            let fix_a = a.next_fix().await.unwrap();
            let fix_b = b.next_fix().await.unwrap();
            assert_eq!(fix_a.point, fix_b.point);
        }
    }
}

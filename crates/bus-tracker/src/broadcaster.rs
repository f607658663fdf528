//! Driver-side location broadcasting
//!
//! One [`LocationBroadcaster`] per driver session. Starting a trip spawns a
//! publish task that samples the session's position source and overwrites
//! the bus's `currentLocation` per fix; stopping cancels the task and
//! leaves the last published position on the document, visible to riders
//! until the next trip starts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bus_core::{BusLocation, BusNumber};
use bus_store::PresenceStore;

use crate::error::{TrackerError, TrackerResult};
use crate::position::PositionSource;

/// Placeholder speed range (km/h) when simulation fills in missing speed
const SIMULATED_SPEED_KMH: std::ops::Range<f64> = 10.0..50.0;

/// Session states of a driver's broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

/// Behavior toggles for a driver session
#[derive(Debug, Clone, Default)]
pub struct BroadcasterConfig {
    /// Publish a bounded placeholder speed when a fix reports none.
    /// A simulation capability for sensor-less environments; never enable
    /// it alongside a real receiver. With the gate off, `speedKmh` is
    /// simply absent from published locations.
    pub simulate_missing_speed: bool,
}

/// Publishes a driver's position stream onto their bus document
pub struct LocationBroadcaster {
    store: PresenceStore,
    config: BroadcasterConfig,
    session: Option<Session>,
}

struct Session {
    bus_number: BusNumber,
    task: JoinHandle<()>,
}

impl LocationBroadcaster {
    pub fn new(store: PresenceStore) -> Self {
        Self::with_config(store, BroadcasterConfig::default())
    }

    pub fn with_config(store: PresenceStore, config: BroadcasterConfig) -> Self {
        Self {
            store,
            config,
            session: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        match self.session {
            Some(_) => TrackingState::Tracking,
            None => TrackingState::Idle,
        }
    }

    /// Bus currently being tracked, if a trip is running
    pub fn tracked_bus(&self) -> Option<&BusNumber> {
        self.session.as_ref().map(|session| &session.bus_number)
    }

    /// Start a trip: `Idle → Tracking`. Fails with
    /// [`TrackerError::AlreadyTracking`] while a trip is running.
    pub fn start_tracking<S: PositionSource>(
        &mut self,
        bus_number: BusNumber,
        source: S,
    ) -> TrackerResult<()> {
        if let Some(session) = &self.session {
            return Err(TrackerError::AlreadyTracking(session.bus_number.clone()));
        }

        let task = tokio::spawn(run_session(
            self.store.clone(),
            self.config.clone(),
            bus_number.clone(),
            source,
        ));

        info!("location tracking started for bus {}", bus_number);
        self.session = Some(Session { bus_number, task });
        Ok(())
    }

    /// End the trip: `Tracking → Idle`. Cancels sampling and publishing;
    /// the last published location stays on the bus document. A no-op
    /// while idle.
    pub fn stop_tracking(&mut self) {
        match self.session.take() {
            Some(session) => {
                session.task.abort();
                info!("location tracking stopped for bus {}", session.bus_number);
            }
            None => debug!("stop requested while idle"),
        }
    }
}

impl Drop for LocationBroadcaster {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

async fn run_session<S: PositionSource>(
    store: PresenceStore,
    config: BroadcasterConfig,
    bus_number: BusNumber,
    mut source: S,
) {
    let mut rng = StdRng::from_os_rng();

    while let Some(fix) = source.next_fix().await {
        if !fix.point.is_valid() {
            warn!(
                "discarding out-of-range fix for bus {}: {:?}",
                bus_number, fix.point
            );
            continue;
        }

        let speed_kmh = match fix.speed_mps {
            Some(mps) => Some((mps * 3.6).round()),
            None if config.simulate_missing_speed => {
                Some(rng.random_range(SIMULATED_SPEED_KMH).floor())
            }
            None => None,
        };

        let location = BusLocation {
            lat: fix.point.lat,
            lng: fix.point.lng,
            timestamp_millis: fix.timestamp.timestamp_millis(),
            speed_kmh,
        };

        if let Err(e) = store.buses().update_location(&bus_number, &location).await {
            // one lost tick; the next fix retries naturally
            warn!("failed to publish location for bus {}: {}", bus_number, e);
        }
    }

    debug!("position source for bus {} ended", bus_number);
}

// ============================================================================
// TESTS
// ============================================================================

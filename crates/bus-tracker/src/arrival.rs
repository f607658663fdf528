//! Arrival notifications derived from a bus's location stream
//!
//! A rider dashboard watches a single bus and keeps two pieces of derived
//! state: the latest observation (driver name, current location) and a
//! transient "arriving soon" notice. The notice heuristic is the portal's
//! crude slow-speed proxy for "approaching a stop": it looks only at the
//! reported speed, not at stop geometry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use bus_core::{Bus, BusLocation, BusNumber};
use bus_store::{PresenceStore, SubscriptionHandle};

use crate::error::TrackerResult;

/// Driver display fallback when the bus has no driver reference
pub const DRIVER_NOT_ASSIGNED: &str = "Not Assigned";

/// Tuning for the arrival heuristic
#[derive(Debug, Clone)]
pub struct ArrivalConfig {
    /// Speeds above zero and below this read as "slowing near a stop"
    pub approach_speed_kmh: f64,
    /// How long a raised notice stays up before clearing itself
    pub notice_ttl: Duration,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            approach_speed_kmh: 10.0,
            notice_ttl: Duration::from_secs(5),
        }
    }
}

/// Transient "arriving soon" signal
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalNotice {
    pub bus_number: BusNumber,
    pub speed_kmh: f64,
    pub raised_at: DateTime<Utc>,
}

/// Latest view of the watched bus
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BusObservation {
    /// No push seen yet, or no document matches the bus number. The bus
    /// is unknown; downstream renders that state, it never errors.
    #[default]
    Unknown,
    Observed {
        driver_name: String,
        location: Option<BusLocation>,
    },
}

/// Watches one bus and raises transient arrival notices
pub struct ArrivalNotifier {
    observation_rx: watch::Receiver<BusObservation>,
    notice_rx: watch::Receiver<Option<ArrivalNotice>>,
    subscription: SubscriptionHandle,
}

impl ArrivalNotifier {
    pub fn watch(store: &PresenceStore, bus_number: BusNumber) -> TrackerResult<Self> {
        Self::with_config(store, bus_number, ArrivalConfig::default())
    }

    pub fn with_config(
        store: &PresenceStore,
        bus_number: BusNumber,
        config: ArrivalConfig,
    ) -> TrackerResult<Self> {
        let (observation_tx, observation_rx) = watch::channel(BusObservation::Unknown);
        let (notice_tx, notice_rx) = watch::channel(None);

        let heuristic = Arc::new(Heuristic {
            bus_number: bus_number.clone(),
            config,
            observation_tx,
            notice_tx: Arc::new(notice_tx),
            clear_task: Mutex::new(None),
        });

        let subscription = store
            .buses()
            .subscribe_bus(&bus_number, move |bus| heuristic.on_push(bus))?;

        Ok(Self {
            observation_rx,
            notice_rx,
            subscription,
        })
    }

    /// Latest observed state of the bus
    pub fn observation(&self) -> watch::Receiver<BusObservation> {
        self.observation_rx.clone()
    }

    /// Current transient notice; `None` while quiet
    pub fn notices(&self) -> watch::Receiver<Option<ArrivalNotice>> {
        self.notice_rx.clone()
    }

    /// Stop watching the bus. Idempotent; also implied by drop.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}

struct Heuristic {
    bus_number: BusNumber,
    config: ArrivalConfig,
    observation_tx: watch::Sender<BusObservation>,
    notice_tx: Arc<watch::Sender<Option<ArrivalNotice>>>,
    clear_task: Mutex<Option<JoinHandle<()>>>,
}

impl Heuristic {
    fn on_push(&self, bus: Option<Bus>) {
        let Some(bus) = bus else {
            self.observation_tx.send_replace(BusObservation::Unknown);
            return;
        };

        let driver_name = bus
            .driver_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DRIVER_NOT_ASSIGNED.to_string());
        self.observation_tx.send_replace(BusObservation::Observed {
            driver_name,
            location: bus.current_location.clone(),
        });

        // no notice without a location and a reported speed
        let Some(speed) = bus.current_location.and_then(|location| location.speed_kmh) else {
            return;
        };
        if speed > 0.0 && speed < self.config.approach_speed_kmh {
            self.raise(speed);
        }
    }

    fn raise(&self, speed_kmh: f64) {
        debug!(
            "bus {} moving slowly ({} km/h); raising arrival notice",
            self.bus_number, speed_kmh
        );
        self.notice_tx.send_replace(Some(ArrivalNotice {
            bus_number: self.bus_number.clone(),
            speed_kmh,
            raised_at: Utc::now(),
        }));

        // a fresh notice restarts the auto-clear clock
        let mut guard = self.clear_task.lock();
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        let notice_tx = Arc::clone(&self.notice_tx);
        let ttl = self.config.notice_ttl;
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            notice_tx.send_replace(None);
        }));
    }
}

// ============================================================================
// TESTS
// ============================================================================

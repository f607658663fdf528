//! Live snapshots backing the admin overview
//!
//! One [`AdminDashboard`] per admin session. It holds the four store
//! subscriptions the overview screen feeds from and keeps the latest
//! snapshot of each collection; closing the dashboard (or dropping it)
//! releases every subscription.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use bus_core::{Bus, Driver, Student};
use bus_store::{PresenceStore, SubscriptionSet};

use crate::error::TrackerResult;

/// Counts shown on the admin overview cards
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub student_count: usize,
    pub online_count: usize,
    pub driver_count: usize,
    pub bus_count: usize,
    pub active_bus_count: usize,
}

/// Maintains live collection snapshots for one admin session
pub struct AdminDashboard {
    students: Arc<RwLock<Vec<Student>>>,
    online: Arc<RwLock<Vec<Student>>>,
    drivers: Arc<RwLock<Vec<Driver>>>,
    buses: Arc<RwLock<Vec<Bus>>>,
    subscriptions: SubscriptionSet,
}

impl AdminDashboard {
    /// Subscribe to every collection the overview renders
    pub fn open(store: &PresenceStore) -> TrackerResult<Self> {
        let students = Arc::new(RwLock::new(Vec::new()));
        let online = Arc::new(RwLock::new(Vec::new()));
        let drivers = Arc::new(RwLock::new(Vec::new()));
        let buses = Arc::new(RwLock::new(Vec::new()));

        let mut subscriptions = SubscriptionSet::new();

        let slot = students.clone();
        subscriptions.insert(store.students().subscribe(move |snapshot| {
            *slot.write() = snapshot;
        })?);

        let slot = online.clone();
        subscriptions.insert(store.students().subscribe_online(move |snapshot| {
            *slot.write() = snapshot;
        })?);

        let slot = drivers.clone();
        subscriptions.insert(store.drivers().subscribe(move |snapshot| {
            *slot.write() = snapshot;
        })?);

        let slot = buses.clone();
        subscriptions.insert(store.buses().subscribe(move |snapshot| {
            *slot.write() = snapshot;
        })?);

        Ok(Self {
            students,
            online,
            drivers,
            buses,
            subscriptions,
        })
    }

    pub fn students(&self) -> Vec<Student> {
        self.students.read().clone()
    }

    pub fn online_students(&self) -> Vec<Student> {
        self.online.read().clone()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers.read().clone()
    }

    pub fn buses(&self) -> Vec<Bus> {
        self.buses.read().clone()
    }

    pub fn stats(&self) -> DashboardStats {
        let buses = self.buses.read();
        DashboardStats {
            student_count: self.students.read().len(),
            online_count: self.online.read().len(),
            driver_count: self.drivers.read().len(),
            bus_count: buses.len(),
            active_bus_count: buses.iter().filter(|bus| bus.is_active).count(),
        }
    }

    /// Release every subscription held by this dashboard
    pub fn close(&mut self) {
        self.subscriptions.release_all();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bus_core::BusNumber;
    use bus_store::MemoryStore;
    use std::time::Duration;
    use tokio::time::sleep;

    fn presence() -> PresenceStore {
        PresenceStore::new(Arc::new(MemoryStore::new()))
    }

    async fn wait_until(mut ready: impl FnMut() -> bool) {
        for _ in 0..50 {
            if ready() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("dashboard snapshot never settled");
    }

    #[tokio::test]
    async fn test_snapshots_follow_the_collections() {
        let store = presence();
        let dashboard = AdminDashboard::open(&store).unwrap();

        store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        store
            .drivers()
            .create(&Driver::new(
                "Kumar",
                "kumar@vsb.edu.in",
                BusNumber::new("VSB-001"),
                "98400",
            ))
            .await
            .unwrap();
        store
            .buses()
            .create(&Bus::new(BusNumber::new("VSB-001")))
            .await
            .unwrap();

        wait_until(|| {
            let stats = dashboard.stats();
            stats.student_count == 1
                && stats.online_count == 1
                && stats.driver_count == 1
                && stats.bus_count == 1
                && stats.active_bus_count == 1
        })
        .await;

        assert_eq!(dashboard.students()[0].name, "Alice");
        assert_eq!(dashboard.drivers()[0].name, "Kumar");
    }

    #[tokio::test]
    async fn test_online_snapshot_tracks_logouts() {
        let store = presence();
        let dashboard = AdminDashboard::open(&store).unwrap();

        let id = store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        wait_until(|| dashboard.stats().online_count == 1).await;

        store.students().set_offline(&id).await.unwrap();
        wait_until(|| dashboard.stats().online_count == 0).await;
        assert_eq!(dashboard.stats().student_count, 1);
    }

    #[tokio::test]
    async fn test_closed_dashboard_stops_updating() {
        let store = presence();
        let mut dashboard = AdminDashboard::open(&store).unwrap();
        dashboard.close();

        store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(dashboard.stats().student_count, 0);
    }
}

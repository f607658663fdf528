//! Typed store layer
//!
//! [`PresenceStore`] wraps a [`DocumentStore`] behind per-collection
//! repositories with typed CRUD and subscribe operations. The store is
//! constructor-injected so callers and tests choose the backend; nothing
//! in the engine reaches for a shared singleton.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use bus_core::{
    AttendanceRecord, Bus, BusId, BusLocation, BusNumber, Driver, DriverId, Student, StudentId,
};
use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::subscription::{RawSubscription, SubscriptionHandle, spawn_dispatch};
use crate::{BUSES, DRIVERS, Document, DocumentStore, KeyFilter, STUDENTS};

/// Typed facade over the document store
///
/// Construct one per process (or per test) from whatever backend is in
/// play and hand clones to each component that needs it.
#[derive(Clone)]
pub struct PresenceStore {
    store: Arc<dyn DocumentStore>,
    students: StudentRepository,
    drivers: DriverRepository,
    buses: BusRepository,
}

impl PresenceStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            students: StudentRepository::new(store.clone()),
            drivers: DriverRepository::new(store.clone()),
            buses: BusRepository::new(store.clone()),
            store,
        }
    }

    pub fn students(&self) -> &StudentRepository {
        &self.students
    }

    pub fn drivers(&self) -> &DriverRepository {
        &self.drivers
    }

    pub fn buses(&self) -> &BusRepository {
        &self.buses
    }

    /// Probe connectivity to the backing store
    pub async fn check_connection(&self) -> StoreResult<()> {
        self.store.health_check().await
    }
}

fn encode<T: serde::Serialize>(entity: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(entity)?)
}

fn decode_student(doc: &Document) -> StoreResult<Student> {
    let mut student: Student = serde_json::from_value(doc.fields.clone())?;
    student.id = StudentId::new(doc.id.clone());
    Ok(student)
}

fn decode_driver(doc: &Document) -> StoreResult<Driver> {
    let mut driver: Driver = serde_json::from_value(doc.fields.clone())?;
    driver.id = DriverId::new(doc.id.clone());
    Ok(driver)
}

fn decode_bus(doc: &Document) -> StoreResult<Bus> {
    let mut bus: Bus = serde_json::from_value(doc.fields.clone())?;
    bus.id = BusId::new(doc.id.clone());
    Ok(bus)
}

fn decode_all<T>(
    docs: &[Document],
    decode: impl Fn(&Document) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    docs.iter().map(decode).collect()
}

// ============================================================================
// STUDENTS
// ============================================================================

/// Typed operations on the `students` collection
#[derive(Clone)]
pub struct StudentRepository {
    store: Arc<dyn DocumentStore>,
}

impl StudentRepository {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, student: &Student) -> StoreResult<StudentId> {
        let id = self.store.create(STUDENTS, encode(student)?).await?;
        Ok(StudentId::new(id))
    }

    pub async fn get(&self, id: &StudentId) -> StoreResult<Option<Student>> {
        match self.store.get(STUDENTS, id.as_str()).await? {
            Some(doc) => Ok(Some(decode_student(&doc)?)),
            None => Ok(None),
        }
    }

    /// Look up a student by the `(name, busNumber)` business key.
    ///
    /// Returns the first match in insertion order. Nothing enforces
    /// uniqueness of the key; if duplicates ever exist, this function is
    /// where a unique-index check would go.
    pub async fn find(&self, name: &str, bus_number: &BusNumber) -> StoreResult<Option<Student>> {
        let filter = KeyFilter::field("name", name).and("busNumber", bus_number.as_str());
        match self.store.get_by_key(STUDENTS, &filter).await? {
            Some(doc) => Ok(Some(decode_student(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Student>> {
        let docs = self.store.get_all(STUDENTS).await?;
        decode_all(&docs, decode_student)
    }

    /// Admin edit: shallow-merge arbitrary fields
    pub async fn update(&self, id: &StudentId, patch: Value) -> StoreResult<()> {
        self.store.update(STUDENTS, id.as_str(), patch).await
    }

    pub async fn delete(&self, id: &StudentId) -> StoreResult<()> {
        self.store.delete(STUDENTS, id.as_str()).await
    }

    /// Mark the student present online, stamping `lastLogin`
    pub async fn set_online(&self, id: &StudentId) -> StoreResult<()> {
        self.store
            .update(
                STUDENTS,
                id.as_str(),
                json!({"isOnline": true, "lastLogin": Utc::now()}),
            )
            .await
    }

    /// Mark the student offline, stamping `lastLogout`
    pub async fn set_offline(&self, id: &StudentId) -> StoreResult<()> {
        self.store
            .update(
                STUDENTS,
                id.as_str(),
                json!({"isOnline": false, "lastLogout": Utc::now()}),
            )
            .await
    }

    /// Persist a student's full attendance sequence plus the
    /// `lastAttendance` stamp. The sequence is written wholesale; the
    /// caller owns the at-most-one-per-day invariant.
    pub async fn record_attendance(
        &self,
        id: &StudentId,
        attendance: &[AttendanceRecord],
    ) -> StoreResult<()> {
        self.store
            .update(
                STUDENTS,
                id.as_str(),
                json!({"attendance": attendance, "lastAttendance": Utc::now()}),
            )
            .await
    }

    /// Subscribe to the full student collection
    pub fn subscribe<F>(&self, callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: FnMut(Vec<Student>) + Send + 'static,
    {
        let raw = self.store.subscribe(STUDENTS, None)?;
        Ok(dispatch_decoded(raw, STUDENTS, decode_student, callback))
    }

    /// Subscribe to students currently marked online
    pub fn subscribe_online<F>(&self, callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: FnMut(Vec<Student>) + Send + 'static,
    {
        let raw = self
            .store
            .subscribe(STUDENTS, Some(KeyFilter::field("isOnline", true)))?;
        Ok(dispatch_decoded(raw, STUDENTS, decode_student, callback))
    }
}

// ============================================================================
// DRIVERS
// ============================================================================

/// Typed operations on the `drivers` collection. Admin-owned CRUD.
#[derive(Clone)]
pub struct DriverRepository {
    store: Arc<dyn DocumentStore>,
}

impl DriverRepository {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, driver: &Driver) -> StoreResult<DriverId> {
        let id = self.store.create(DRIVERS, encode(driver)?).await?;
        Ok(DriverId::new(id))
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Driver>> {
        let docs = self.store.get_all(DRIVERS).await?;
        decode_all(&docs, decode_driver)
    }

    pub async fn update(&self, id: &DriverId, patch: Value) -> StoreResult<()> {
        self.store.update(DRIVERS, id.as_str(), patch).await
    }

    pub async fn delete(&self, id: &DriverId) -> StoreResult<()> {
        self.store.delete(DRIVERS, id.as_str()).await
    }

    pub fn subscribe<F>(&self, callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: FnMut(Vec<Driver>) + Send + 'static,
    {
        let raw = self.store.subscribe(DRIVERS, None)?;
        Ok(dispatch_decoded(raw, DRIVERS, decode_driver, callback))
    }
}

// ============================================================================
// BUSES
// ============================================================================

/// Typed operations on the `buses` collection
#[derive(Clone)]
pub struct BusRepository {
    store: Arc<dyn DocumentStore>,
}

impl BusRepository {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, bus: &Bus) -> StoreResult<BusId> {
        let id = self.store.create(BUSES, encode(bus)?).await?;
        Ok(BusId::new(id))
    }

    /// Look up a bus by its business number.
    ///
    /// First match in insertion order; see [`StudentRepository::find`] for
    /// the uniqueness caveat. Every bus-number lookup in the engine goes
    /// through here.
    pub async fn find(&self, number: &BusNumber) -> StoreResult<Option<Bus>> {
        let filter = KeyFilter::field("busNumber", number.as_str());
        match self.store.get_by_key(BUSES, &filter).await? {
            Some(doc) => Ok(Some(decode_bus(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Bus>> {
        let docs = self.store.get_all(BUSES).await?;
        decode_all(&docs, decode_bus)
    }

    pub async fn update(&self, id: &BusId, patch: Value) -> StoreResult<()> {
        self.store.update(BUSES, id.as_str(), patch).await
    }

    /// Assign a driver, caching the display name on the bus document so
    /// rider dashboards need not join against `drivers`
    pub async fn assign_driver(&self, id: &BusId, driver: &Driver) -> StoreResult<()> {
        self.store
            .update(
                BUSES,
                id.as_str(),
                json!({"driverId": driver.id, "driverName": driver.name}),
            )
            .await
    }

    pub async fn delete(&self, id: &BusId) -> StoreResult<()> {
        self.store.delete(BUSES, id.as_str()).await
    }

    /// Overwrite the bus's current location wholesale. No history is kept.
    pub async fn update_location(
        &self,
        number: &BusNumber,
        location: &BusLocation,
    ) -> StoreResult<()> {
        let bus = self
            .find(number)
            .await?
            .ok_or_else(|| StoreError::not_found(BUSES, number.as_str()))?;
        self.store
            .update(
                BUSES,
                bus.id.as_str(),
                json!({"currentLocation": location}),
            )
            .await
    }

    pub fn subscribe<F>(&self, callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: FnMut(Vec<Bus>) + Send + 'static,
    {
        let raw = self.store.subscribe(BUSES, None)?;
        Ok(dispatch_decoded(raw, BUSES, decode_bus, callback))
    }

    /// Subscribe to a single bus by number. The callback receives the
    /// current document, or `None` when no document matches; consumers
    /// treat that as "bus unknown", not an error.
    pub fn subscribe_bus<F>(&self, number: &BusNumber, mut callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: FnMut(Option<Bus>) + Send + 'static,
    {
        let raw = self
            .store
            .subscribe(BUSES, Some(KeyFilter::field("busNumber", number.as_str())))?;

        Ok(spawn_dispatch(raw, move |docs| {
            match docs.first().map(decode_bus).transpose() {
                Ok(bus) => callback(bus),
                Err(e) => warn!("dropping undecodable bus snapshot: {}", e),
            }
        }))
    }
}

/// Decode every pushed snapshot and hand it to the callback, dropping
/// snapshots that fail to decode
fn dispatch_decoded<T, F>(
    raw: RawSubscription,
    collection: &'static str,
    decode: impl Fn(&Document) -> StoreResult<T> + Send + 'static,
    mut callback: F,
) -> SubscriptionHandle
where
    T: Send + 'static,
    F: FnMut(Vec<T>) + Send + 'static,
{
    spawn_dispatch(raw, move |docs| match decode_all(&docs, &decode) {
        Ok(entities) => callback(entities),
        Err(e) => warn!("dropping undecodable {} snapshot: {}", collection, e),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn presence() -> PresenceStore {
        PresenceStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_student_round_trip_injects_storage_id() {
        let store = presence();
        let student = Student::new("Alice", BusNumber::new("VSB-001"));
        let id = store.students().create(&student).await.unwrap();

        let fetched = store.students().get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.name, "Alice");
        assert_eq!(fetched.bus_number.as_str(), "VSB-001");
    }

    #[tokio::test]
    async fn test_find_student_by_business_key() {
        let store = presence();
        let alice = Student::new("Alice", BusNumber::new("VSB-001"));
        store.students().create(&alice).await.unwrap();

        let found = store
            .students()
            .find("Alice", &BusNumber::new("VSB-001"))
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .students()
            .find("Alice", &BusNumber::new("VSB-002"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_presence_toggles_stamp_timestamps() {
        let store = presence();
        let id = store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();

        store.students().set_offline(&id).await.unwrap();
        let student = store.students().get(&id).await.unwrap().unwrap();
        assert!(!student.is_online);
        assert!(student.last_logout.is_some());

        store.students().set_online(&id).await.unwrap();
        let student = store.students().get(&id).await.unwrap().unwrap();
        assert!(student.is_online);
        assert!(student.last_login.is_some());
    }

    #[tokio::test]
    async fn test_record_attendance_persists_sequence_and_stamp() {
        let store = presence();
        let id = store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();

        let sequence = vec![AttendanceRecord::new("2025-06-02", BusNumber::new("VSB-001"))];
        store.students().record_attendance(&id, &sequence).await.unwrap();

        let student = store.students().get(&id).await.unwrap().unwrap();
        assert_eq!(student.attendance, sequence);
        assert!(student.last_attendance.is_some());
    }

    #[tokio::test]
    async fn test_update_location_overwrites_wholesale() {
        let store = presence();
        let number = BusNumber::new("VSB-001");
        store.buses().create(&Bus::new(number.clone())).await.unwrap();

        let first = BusLocation {
            lat: 11.0168,
            lng: 76.9558,
            timestamp_millis: 1,
            speed_kmh: Some(24.0),
        };
        store.buses().update_location(&number, &first).await.unwrap();

        let second = BusLocation {
            lat: 11.0178,
            lng: 76.9568,
            timestamp_millis: 2,
            speed_kmh: None,
        };
        store.buses().update_location(&number, &second).await.unwrap();

        let bus = store.buses().find(&number).await.unwrap().unwrap();
        let location = bus.current_location.unwrap();
        assert_eq!(location.timestamp_millis, 2);
        // no residue from the first write
        assert!(location.speed_kmh.is_none());
    }

    #[tokio::test]
    async fn test_update_location_for_unknown_bus_is_not_found() {
        let store = presence();
        let location = BusLocation {
            lat: 11.0168,
            lng: 76.9558,
            timestamp_millis: 1,
            speed_kmh: None,
        };
        let err = store
            .buses()
            .update_location(&BusNumber::new("VSB-404"), &location)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_assign_driver_caches_display_name() {
        let store = presence();
        let bus_id = store
            .buses()
            .create(&Bus::new(BusNumber::new("VSB-001")))
            .await
            .unwrap();
        let mut driver = Driver::new("Kumar", "kumar@vsb.edu.in", BusNumber::new("VSB-001"), "98400");
        driver.id = store.drivers().create(&driver).await.unwrap();

        store.buses().assign_driver(&bus_id, &driver).await.unwrap();

        let bus = store
            .buses()
            .find(&BusNumber::new("VSB-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bus.driver_name.as_deref(), Some("Kumar"));
        assert_eq!(bus.driver_id, Some(driver.id));
    }

    #[tokio::test]
    async fn test_subscribe_bus_delivers_none_when_unmatched() {
        let store = presence();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = store
            .buses()
            .subscribe_bus(&BusNumber::new("VSB-001"), move |bus| {
                tx.send(bus).ok();
            })
            .unwrap();

        // a change to the collection that still matches nothing
        store.buses().create(&Bus::new(BusNumber::new("VSB-002"))).await.unwrap();
        let push = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(push.is_none());

        store.buses().create(&Bus::new(BusNumber::new("VSB-001"))).await.unwrap();
        let push = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(push.unwrap().bus_number.as_str(), "VSB-001");
    }

    #[tokio::test]
    async fn test_subscribe_online_filters_students() {
        let store = presence();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = store
            .students()
            .subscribe_online(move |students: Vec<Student>| {
                tx.send(students.len()).ok();
            })
            .unwrap();

        let id = store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        let online = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(online, 1);

        store.students().set_offline(&id).await.unwrap();
        let online = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(online, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_before_any_push_never_fires_callback() {
        let store = presence();
        let fired = Arc::new(AtomicBool::new(false));
        let observed = fired.clone();
        let handle = store
            .students()
            .subscribe(move |_students| {
                observed.store(true, Ordering::SeqCst);
            })
            .unwrap();

        handle.unsubscribe();

        store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_admin_crud_surface() {
        let store = presence();

        let mut driver =
            Driver::new("Kumar", "kumar@vsb.edu.in", BusNumber::new("VSB-001"), "98400");
        driver.id = store.drivers().create(&driver).await.unwrap();
        store
            .drivers()
            .update(&driver.id, json!({"phone": "99999"}))
            .await
            .unwrap();
        let drivers = store.drivers().get_all().await.unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].phone, "99999");
        store.drivers().delete(&driver.id).await.unwrap();
        assert!(store.drivers().get_all().await.unwrap().is_empty());

        let id = store
            .students()
            .create(&Student::new("Alice", BusNumber::new("VSB-001")))
            .await
            .unwrap();
        store
            .students()
            .update(&id, json!({"stopName": "Library Stop"}))
            .await
            .unwrap();
        let students = store.students().get_all().await.unwrap();
        assert_eq!(students[0].stop_name, "Library Stop");
        store.students().delete(&id).await.unwrap();
        assert!(store.students().get_all().await.unwrap().is_empty());

        let bus_id = store
            .buses()
            .create(&Bus::new(BusNumber::new("VSB-001")))
            .await
            .unwrap();
        store
            .buses()
            .update(&bus_id, json!({"isActive": false}))
            .await
            .unwrap();
        let buses = store.buses().get_all().await.unwrap();
        assert!(!buses[0].is_active);
        store.buses().delete(&bus_id).await.unwrap();
        assert!(store.buses().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connectivity_failure_propagates() {
        let backend = MemoryStore::new();
        let store = PresenceStore::new(Arc::new(backend.clone()));
        backend.set_offline(true);

        assert!(store.check_connection().await.is_err());
        let err = store
            .students()
            .find("Alice", &BusNumber::new("VSB-001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connectivity(_)));
    }
}

//! Student attendance and presence tracking
//!
//! Login resolves (or creates) the student record, marks them online and
//! appends today's attendance; logout marks them offline. Attendance is
//! idempotent per calendar day by a read-then-check, not by a store
//! constraint; see [`AttendanceTracker::mark_attendance`].

use chrono::Local;
use tracing::{debug, info, warn};

use bus_core::{AttendanceRecord, BusNumber, Student, StudentId};
use bus_store::PresenceStore;

use crate::error::TrackerResult;

/// Day key for attendance records: the local calendar date
pub fn today_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Records daily attendance and presence around student logins
pub struct AttendanceTracker {
    store: PresenceStore,
}

impl AttendanceTracker {
    pub fn new(store: PresenceStore) -> Self {
        Self { store }
    }

    /// Resolve the student for a login and mark them present.
    ///
    /// An existing `(name, busNumber)` identity is reused; otherwise a new
    /// student is created with the default stop and an empty attendance
    /// sequence. Store failures surface to the caller, who may retry the
    /// login; there is no retry here.
    pub async fn login(&self, name: &str, bus_number: &BusNumber) -> TrackerResult<StudentId> {
        match self.store.students().find(name, bus_number).await? {
            Some(student) => {
                self.store.students().set_online(&student.id).await?;
                self.mark_attendance(&student.id, bus_number).await?;
                info!("student {} logged in as {}", name, student.id);
                Ok(student.id)
            }
            None => {
                let student = Student::new(name, bus_number.clone());
                let id = self.store.students().create(&student).await?;
                self.mark_attendance(&id, bus_number).await?;
                info!("created student {} for first login of {}", id, name);
                Ok(id)
            }
        }
    }

    /// Append today's attendance record unless one already exists.
    ///
    /// Read-then-write without a compare-and-swap: two same-day logins
    /// racing the existence check can both append. That fits the
    /// single-student, single-device usage pattern; an observed duplicate
    /// is logged as a write race, never raised.
    pub async fn mark_attendance(
        &self,
        id: &StudentId,
        bus_number: &BusNumber,
    ) -> TrackerResult<()> {
        let today = today_key();
        let Some(student) = self.store.students().get(id).await? else {
            warn!("attendance skipped; student {} not found", id);
            return Ok(());
        };

        let today_records = student
            .attendance
            .iter()
            .filter(|record| record.date == today)
            .count();
        if today_records > 0 {
            if today_records > 1 {
                warn!(
                    "student {} carries {} attendance records for {}; write race suspected",
                    id, today_records, today
                );
            }
            debug!("attendance already marked today for student {}", id);
            return Ok(());
        }

        let mut attendance = student.attendance;
        attendance.push(AttendanceRecord::new(today, bus_number.clone()));
        self.store.students().record_attendance(id, &attendance).await?;
        info!("attendance marked for student {}", id);
        Ok(())
    }

    /// End the session: mark the student offline, stamping `lastLogout`.
    ///
    /// Must run on every session end, abrupt teardowns included. There is
    /// no server-side expiry; a missed call leaves the student online
    /// until the next login or an admin edit.
    pub async fn logout(&self, id: &StudentId) -> TrackerResult<()> {
        self.store.students().set_offline(id).await?;
        info!("student {} logged out", id);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

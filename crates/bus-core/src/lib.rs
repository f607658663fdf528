//! # Bus Core
//!
//! Core domain models and types for the campus bus tracking portal.
//! This crate provides shared types used across all member crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod geo;

pub use geo::*;

/// Default stop assigned to students created on first login
pub const DEFAULT_STOP_NAME: &str = "Main Gate";

/// Campus mail domain used when deriving a student email from their name
pub const CAMPUS_EMAIL_DOMAIN: &str = "vsb.edu.in";

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Storage-assigned identifier for a student document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StudentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StudentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Storage-assigned identifier for a driver document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage-assigned identifier for a bus document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusId(pub String);

impl BusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business identifier for a bus (e.g. "VSB-001")
///
/// This is the key used for lookups and for addressing location updates,
/// not the storage-assigned document id. Uniqueness across bus documents
/// is a convention, not a constraint the store enforces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusNumber(pub String);

impl BusNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BusNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BusNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// STUDENT MODELS
// ============================================================================

/// One attendance mark for one calendar day
///
/// Immutable once created; a student's attendance sequence is append-only
/// and carries at most one record per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// Local calendar-day key, formatted `%Y-%m-%d`
    pub date: String,
    pub timestamp_millis: i64,
    pub bus_number: BusNumber,
}

impl AttendanceRecord {
    /// Create a record for the given day, stamped with the current time
    pub fn new(date: impl Into<String>, bus_number: BusNumber) -> Self {
        Self {
            date: date.into(),
            timestamp_millis: Utc::now().timestamp_millis(),
            bus_number,
        }
    }
}

/// A student riding a campus bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Storage id, injected when decoding; never persisted among fields
    #[serde(skip)]
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub bus_number: BusNumber,
    pub stop_name: String,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_logout: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attendance: Option<DateTime<Utc>>,
}

impl Student {
    /// Create a student as the login flow does on first sight: default stop,
    /// empty attendance, email derived from the name, online as of now.
    pub fn new(name: impl Into<String>, bus_number: BusNumber) -> Self {
        let name = name.into();
        Self {
            email: Self::derive_email(&name),
            id: StudentId::default(),
            name,
            bus_number,
            stop_name: DEFAULT_STOP_NAME.to_string(),
            attendance: Vec::new(),
            is_online: true,
            last_login: Some(Utc::now()),
            last_logout: None,
            last_attendance: None,
        }
    }

    /// Campus email derived from a display name: lowercased, whitespace
    /// runs collapsed to a single dot.
    pub fn derive_email(name: &str) -> String {
        let local: Vec<String> = name
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        format!("{}@{}", local.join("."), CAMPUS_EMAIL_DOMAIN)
    }

    /// Check whether an attendance record exists for the given day key
    pub fn has_attendance_on(&self, date: &str) -> bool {
        self.attendance.iter().any(|record| record.date == date)
    }
}

// ============================================================================
// DRIVER MODELS
// ============================================================================

/// A driver assigned to a campus bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(skip)]
    pub id: DriverId,
    pub name: String,
    pub email: String,
    pub bus_number: BusNumber,
    pub phone: String,
    #[serde(default)]
    pub is_active: bool,
}

impl Driver {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        bus_number: BusNumber,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            id: DriverId::default(),
            name: name.into(),
            email: email.into(),
            bus_number,
            phone: phone.into(),
            is_active: true,
        }
    }
}

// ============================================================================
// BUS MODELS
// ============================================================================

/// Latest reported location of a bus
///
/// Overwritten wholesale on every update; no location history is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusLocation {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
}

/// A stop on a bus route. Static reference data, never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStop {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub order: u32,
}

impl BusStop {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64, order: u32) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            order,
        }
    }
}

/// A campus bus with its route and latest location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    #[serde(skip)]
    pub id: BusId,
    pub bus_number: BusNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<DriverId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    /// Absent until a driver starts tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<BusLocation>,
    #[serde(default)]
    pub route: Vec<BusStop>,
    #[serde(default)]
    pub is_active: bool,
}

impl Bus {
    pub fn new(bus_number: BusNumber) -> Self {
        Self {
            id: BusId::default(),
            bus_number,
            driver_id: None,
            driver_name: None,
            current_location: None,
            route: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_route(mut self, route: Vec<BusStop>) -> Self {
        self.route = route;
        self
    }

    pub fn with_driver(mut self, driver_id: DriverId, driver_name: impl Into<String>) -> Self {
        self.driver_id = Some(driver_id);
        self.driver_name = Some(driver_name.into());
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Bus Tracker
//!
//! Presence and live-location engine for the campus bus portal.
//! Ties attendance tracking, driver-side location broadcasting and
//! rider-side arrival notification together over the shared document
//! store.
//!
//! ## Features
//! - Idempotent daily attendance marking on student login
//! - Online/offline presence across login/logout
//! - Driver trip sessions publishing GPS fixes per bus
//! - Transient arrival notices derived from the location stream
//! - Live admin snapshots of students, drivers and buses

pub mod arrival;
pub mod attendance;
pub mod broadcaster;
pub mod dashboard;
pub mod error;
pub mod position;

pub use arrival::{
    ArrivalConfig, ArrivalNotice, ArrivalNotifier, BusObservation, DRIVER_NOT_ASSIGNED,
};
pub use attendance::AttendanceTracker;
pub use broadcaster::{BroadcasterConfig, LocationBroadcaster, TrackingState};
pub use dashboard::{AdminDashboard, DashboardStats};
pub use error::{TrackerError, TrackerResult};
pub use position::{
    PositionFix, PositionSource, SensorPositionSource, SyntheticPositionSource,
};

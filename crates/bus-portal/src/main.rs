//! # Bus Portal
//!
//! Demo entry point for the campus bus tracking engine. Seeds a bus and
//! its driver, runs a synthetic driver trip, logs a student in, and
//! reports arrival notices and the admin overview until interrupted.
//! The in-memory store stands in for the hosted document store.

mod config;

use crate::config::PortalConfig;

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bus_core::{Bus, BusNumber, BusStop, Driver, GeoPoint};
use bus_store::{MemoryStore, PresenceStore};
use bus_tracker::{
    AdminDashboard, ArrivalNotifier, AttendanceTracker, BroadcasterConfig, LocationBroadcaster,
    SyntheticPositionSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("🚌 Starting Campus Bus Portal v0.1.0");

    let config = PortalConfig::from_env();
    info!("Configuration loaded");
    info!("   Bus: {}", config.bus_number);
    info!("   Campus origin: {}, {}", config.campus_lat, config.campus_lng);
    info!("   Publish period: {} ms", config.publish_period_ms);

    let store = PresenceStore::new(Arc::new(MemoryStore::new()));
    let bus_number = BusNumber::new(config.bus_number.clone());
    seed_campus(&store, &bus_number).await?;

    // admin overview
    let mut dashboard = AdminDashboard::open(&store)?;

    // student side: login plus the arrival watcher
    let attendance = AttendanceTracker::new(store.clone());
    let student_id = attendance.login(&config.student_name, &bus_number).await?;

    let notifier = ArrivalNotifier::watch(&store, bus_number.clone())?;
    let mut notices = notifier.notices();
    let notice_task = tokio::spawn(async move {
        while notices.changed().await.is_ok() {
            let notice = notices.borrow_and_update().clone();
            if let Some(notice) = notice {
                info!(
                    "🔔 bus {} arriving soon ({} km/h)",
                    notice.bus_number, notice.speed_kmh
                );
            }
        }
    });

    // driver side: synthetic trip
    let mut broadcaster = LocationBroadcaster::with_config(
        store.clone(),
        BroadcasterConfig {
            simulate_missing_speed: config.simulate_speed,
        },
    );
    let source = SyntheticPositionSource::with_period(
        GeoPoint::new(config.campus_lat, config.campus_lng),
        Duration::from_millis(config.publish_period_ms),
    );
    broadcaster.start_tracking(bus_number.clone(), source)?;

    info!("Portal running; press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut overview = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = overview.tick() => {
                let stats = dashboard.stats();
                info!(
                    "overview: {} students ({} online), {} drivers, {} buses ({} active)",
                    stats.student_count,
                    stats.online_count,
                    stats.driver_count,
                    stats.bus_count,
                    stats.active_bus_count
                );
            }
            _ = &mut shutdown => break,
        }
    }

    // teardown mirrors a real session end: trip stops, the student goes
    // offline, every subscription is released
    broadcaster.stop_tracking();
    attendance.logout(&student_id).await?;
    notifier.unsubscribe();
    notice_task.abort();
    dashboard.close();

    info!("🛑 Portal shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bus_tracker=debug,bus_store=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Seed the demo driver, bus and campus route
async fn seed_campus(store: &PresenceStore, bus_number: &BusNumber) -> anyhow::Result<()> {
    let mut driver = Driver::new(
        "Kumar",
        "kumar@vsb.edu.in",
        bus_number.clone(),
        "98400 12345",
    );
    driver.id = store.drivers().create(&driver).await?;

    let route = vec![
        BusStop::new("Main Gate", 11.0168, 76.9558, 1),
        BusStop::new("Library Stop", 11.0178, 76.9568, 2),
        BusStop::new("Hostel Block", 11.0188, 76.9578, 3),
        BusStop::new("Academic Block", 11.0198, 76.9588, 4),
    ];
    let bus = Bus::new(bus_number.clone()).with_route(route);
    let bus_id = store.buses().create(&bus).await?;
    store.buses().assign_driver(&bus_id, &driver).await?;

    info!("Seeded bus {} with driver {}", bus_number, driver.name);
    Ok(())
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}

//! Portal configuration

/// Demo portal configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Bus the demo trip runs on
    pub bus_number: String,
    /// Origin of the synthetic trip
    pub campus_lat: f64,
    pub campus_lng: f64,
    /// Synthetic publish period in milliseconds
    pub publish_period_ms: u64,
    /// Fill in placeholder speeds on the synthetic trip
    pub simulate_speed: bool,
    /// Student logged in for the demo
    pub student_name: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bus_number: "VSB-001".to_string(),
            campus_lat: 11.0168,
            campus_lng: 76.9558,
            publish_period_ms: 2000,
            simulate_speed: true,
            student_name: "Alice".to_string(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let bus_number =
            std::env::var("PORTAL_BUS_NUMBER").unwrap_or(defaults.bus_number);

        let campus_lat = std::env::var("PORTAL_CAMPUS_LAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.campus_lat);

        let campus_lng = std::env::var("PORTAL_CAMPUS_LNG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.campus_lng);

        let publish_period_ms = std::env::var("PORTAL_PUBLISH_PERIOD_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.publish_period_ms);

        let simulate_speed = std::env::var("PORTAL_SIMULATE_SPEED")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.simulate_speed);

        let student_name =
            std::env::var("PORTAL_STUDENT_NAME").unwrap_or(defaults.student_name);

        Self {
            bus_number,
            campus_lat,
            campus_lng,
            publish_period_ms,
            simulate_speed,
            student_name,
        }
    }
}

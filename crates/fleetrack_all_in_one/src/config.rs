use anyhow::Context;
use chrono::FixedOffset;
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracker_gateway::domain::{AddressCacheScope, AddressResolverConfig, StopDetectionConfig};
use tracker_gateway::geocoding::NominatimConfig;
use tracker_gateway::tcp::TelemetryServerConfig;
use tracker_gateway::tracker_gateway::TrackerGatewayConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Export traces and logs over OTLP
    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    /// Apply pending migrations before serving
    #[serde(default = "default_true")]
    pub run_migrations: bool,

    // Tracker TCP server
    #[serde(default = "default_tcp_host")]
    pub tcp_host: String,

    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// Largest accepted frame, headers included
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Close silent tracker connections after this many seconds; 0 disables
    #[serde(default)]
    pub idle_timeout_secs: u64,

    /// Period of the historique flush timer
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    // Stop detection
    #[serde(default = "default_stop_speed_threshold")]
    pub stop_speed_threshold: f64,

    #[serde(default = "default_min_stop_seconds")]
    pub min_stop_seconds: i64,

    // Address resolution
    #[serde(default = "default_address_threshold_degrees")]
    pub address_threshold_degrees: f64,

    #[serde(default = "default_address_fast_speed")]
    pub address_fast_speed: f64,

    #[serde(default = "default_address_staleness_ms")]
    pub address_staleness_ms: u64,

    /// Pause after each reverse geocoding call
    #[serde(default = "default_geocode_courtesy_delay_ms")]
    pub geocode_courtesy_delay_ms: u64,

    /// per_vehicle or global
    #[serde(default)]
    pub address_cache_scope: AddressCacheScope,

    #[serde(default = "default_geocoder_base_url")]
    pub geocoder_base_url: String,

    #[serde(default = "default_geocoder_user_agent")]
    pub geocoder_user_agent: String,

    #[serde(default = "default_geocoder_timeout_secs")]
    pub geocoder_timeout_secs: u64,

    /// Offset used to render historique dates and clock times
    #[serde(default)]
    pub summary_utc_offset_minutes: i32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "fleetrack-all-in-one".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "fleetrack".to_string()
}

fn default_postgres_username() -> String {
    "fleetrack".to_string()
}

fn default_postgres_password() -> String {
    "fleetrack".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "crates/common/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_true() -> bool {
    true
}

fn default_tcp_host() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    5055
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_flush_interval_secs() -> u64 {
    300
}

fn default_stop_speed_threshold() -> f64 {
    2.0
}

fn default_min_stop_seconds() -> i64 {
    10
}

fn default_address_threshold_degrees() -> f64 {
    0.0003
}

fn default_address_fast_speed() -> f64 {
    10.0
}

fn default_address_staleness_ms() -> u64 {
    30_000
}

fn default_geocode_courtesy_delay_ms() -> u64 {
    1_000
}

fn default_geocoder_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_geocoder_user_agent() -> String {
    "fleetrack-gps-tracker".to_string()
}

fn default_geocoder_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FLEETRACK"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn nominatim_config(&self) -> NominatimConfig {
        NominatimConfig {
            base_url: self.geocoder_base_url.clone(),
            user_agent: self.geocoder_user_agent.clone(),
            timeout: Duration::from_secs(self.geocoder_timeout_secs),
        }
    }

    /// Fails when the summary offset is not a valid UTC offset or the flush interval is zero
    pub fn tracker_gateway_config(&self) -> anyhow::Result<TrackerGatewayConfig> {
        let summary_offset = self
            .summary_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!(
                    "summary_utc_offset_minutes out of range: {}",
                    self.summary_utc_offset_minutes
                )
            })?;
        anyhow::ensure!(
            self.flush_interval_secs > 0,
            "flush_interval_secs must be at least 1"
        );

        Ok(TrackerGatewayConfig {
            server: TelemetryServerConfig {
                host: self.tcp_host.clone(),
                port: self.tcp_port,
                max_frame_bytes: self.max_frame_bytes,
                idle_timeout: (self.idle_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.idle_timeout_secs)),
            },
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            stop_detection: StopDetectionConfig {
                stop_speed_threshold: self.stop_speed_threshold,
                min_stop_seconds: self.min_stop_seconds,
            },
            address: AddressResolverConfig {
                threshold_degrees: self.address_threshold_degrees,
                fast_speed: self.address_fast_speed,
                staleness: Duration::from_millis(self.address_staleness_ms),
                courtesy_delay: Duration::from_millis(self.geocode_courtesy_delay_ms),
                scope: self.address_cache_scope,
            },
            summary_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "FLEETRACK_LOG_LEVEL",
        "FLEETRACK_TCP_PORT",
        "FLEETRACK_IDLE_TIMEOUT_SECS",
        "FLEETRACK_ADDRESS_CACHE_SCOPE",
        "FLEETRACK_SUMMARY_UTC_OFFSET_MINUTES",
        "FLEETRACK_RUN_MIGRATIONS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tcp_port, 5055);
        assert_eq!(config.flush_interval_secs, 300);
        assert_eq!(config.address_cache_scope, AddressCacheScope::PerVehicle);
        assert!(config.run_migrations);

        let gateway = config.tracker_gateway_config().unwrap();
        assert_eq!(gateway.server.idle_timeout, None);
        assert_eq!(gateway.server.max_frame_bytes, 65_536);
        assert_eq!(gateway.stop_detection.min_stop_seconds, 10);
        assert_eq!(gateway.address.courtesy_delay, Duration::from_secs(1));
        assert_eq!(gateway.summary_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("FLEETRACK_LOG_LEVEL", "debug");
        std::env::set_var("FLEETRACK_TCP_PORT", "6000");
        std::env::set_var("FLEETRACK_IDLE_TIMEOUT_SECS", "120");
        std::env::set_var("FLEETRACK_ADDRESS_CACHE_SCOPE", "global");
        std::env::set_var("FLEETRACK_SUMMARY_UTC_OFFSET_MINUTES", "60");
        std::env::set_var("FLEETRACK_RUN_MIGRATIONS", "false");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.tcp_port, 6000);
        assert!(!config.run_migrations);

        let gateway = config.tracker_gateway_config().unwrap();
        assert_eq!(gateway.server.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(gateway.address.scope, AddressCacheScope::Global);
        assert_eq!(gateway.summary_offset.local_minus_utc(), 3600);

        clear_env();
    }

    #[test]
    fn test_offset_out_of_range_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let mut config = ServiceConfig::from_env().unwrap();
        config.summary_utc_offset_minutes = 24 * 60;
        assert!(config.tracker_gateway_config().is_err());

        config.summary_utc_offset_minutes = i32::MAX;
        let err = config.tracker_gateway_config().unwrap_err();
        assert!(err.to_string().contains("summary_utc_offset_minutes out of range"));
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let mut config = ServiceConfig::from_env().unwrap();
        config.flush_interval_secs = 0;
        let err = config.tracker_gateway_config().unwrap_err();
        assert!(err.to_string().contains("flush_interval_secs"));
    }
}

//! Configuration for cu-manager

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Catalog connection
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Controller containers
    #[serde(default)]
    pub controllers: ControllerConfig,

    /// Values forwarded to every controller's environment
    #[serde(default)]
    pub controller_env: ControllerEnvConfig,

    /// Reconcile loop timing
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Persisted assignment state
    #[serde(default)]
    pub state: StateConfig,

    /// Service registration
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Status API
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog, without trailing slash
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// Path segment listing rooms
    #[serde(default = "default_rooms_endpoint")]
    pub rooms_endpoint: String,

    /// Path segment of the service registry
    #[serde(default = "default_services_endpoint")]
    pub services_endpoint: String,

    /// Name the catalog registers itself under
    #[serde(default = "default_registry_name")]
    pub registry_service_name: String,

    /// Resolve the rooms path through the catalog's own service descriptor
    #[serde(default = "default_true")]
    pub discover_endpoints: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            rooms_endpoint: default_rooms_endpoint(),
            services_endpoint: default_services_endpoint(),
            registry_service_name: default_registry_name(),
            discover_endpoints: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How the manager reaches a controller's HTTP API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// `http://<container name>:<port>`, for a manager on the same docker network
    #[default]
    ContainerName,
    /// `http://<container ip>:<port>`
    ContainerIp,
    /// `http://127.0.0.1:<published port>`, for a manager on the docker host
    Localhost,
}

/// Controller container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Image every controller runs
    #[serde(default = "default_image")]
    pub image: String,

    /// Docker network controllers are attached to
    #[serde(default = "default_network")]
    pub network: String,

    /// Prefix of managed container names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// First port tried by the allocator
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of ports scanned above `base_port` before giving up
    #[serde(default = "default_port_search_limit")]
    pub port_search_limit: u16,

    /// Capacity of a single controller
    #[serde(default = "default_rooms_per_controller")]
    pub rooms_per_controller: usize,

    /// Timeout for controller HTTP calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for container runtime calls, in seconds
    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,

    /// Grace period given to `docker stop`, in seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    #[serde(default)]
    pub address_mode: AddressMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            network: default_network(),
            name_prefix: default_name_prefix(),
            base_port: default_base_port(),
            port_search_limit: default_port_search_limit(),
            rooms_per_controller: default_rooms_per_controller(),
            request_timeout_secs: default_request_timeout(),
            runtime_timeout_secs: default_runtime_timeout(),
            stop_timeout_secs: default_stop_timeout(),
            address_mode: AddressMode::default(),
        }
    }
}

impl ControllerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }
}

/// Opaque settings handed to controllers through their environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerEnvConfig {
    /// Catalog URL as seen from inside the controller network.
    /// Falls back to `catalog.url` when unset.
    #[serde(default)]
    pub catalog_url: Option<String>,

    #[serde(default = "default_plants_endpoint")]
    pub plants_endpoint: String,

    #[serde(default = "default_devices_endpoint")]
    pub devices_endpoint: String,

    #[serde(default = "default_general_endpoint")]
    pub general_endpoint: String,

    #[serde(default)]
    pub weather_forecast_url: String,

    #[serde(default)]
    pub weather_forecast_api_key: String,

    #[serde(default = "default_cu_logger")]
    pub base_logger: String,

    #[serde(default = "default_mqtt_logger")]
    pub mqtt_logger: String,

    /// Seconds between topic refreshes inside a controller
    #[serde(default = "default_topics_update_interval")]
    pub topics_update_interval_secs: u64,

    #[serde(default = "default_mqtt_client_prefix")]
    pub mqtt_client_prefix: String,
}

impl Default for ControllerEnvConfig {
    fn default() -> Self {
        Self {
            catalog_url: None,
            plants_endpoint: default_plants_endpoint(),
            devices_endpoint: default_devices_endpoint(),
            general_endpoint: default_general_endpoint(),
            weather_forecast_url: String::new(),
            weather_forecast_api_key: String::new(),
            base_logger: default_cu_logger(),
            mqtt_logger: default_mqtt_logger(),
            topics_update_interval_secs: default_topics_update_interval(),
            mqtt_client_prefix: default_mqtt_client_prefix(),
        }
    }
}

/// Reconcile loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between passes
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// First retry delay after the catalog was unreachable
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_secs: u64,

    /// Upper bound of the retry delay
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
            backoff_initial_secs: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Service registration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// JSON endpoint-shape template posted with each controller descriptor
    #[serde(default)]
    pub spec_file: Option<PathBuf>,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_catalog_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_rooms_endpoint() -> String {
    "rooms".to_string()
}

fn default_services_endpoint() -> String {
    "services".to_string()
}

fn default_registry_name() -> String {
    "registry".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_runtime_timeout() -> u64 {
    30
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_image() -> String {
    "controller_image".to_string()
}

fn default_network() -> String {
    "smart_care_network".to_string()
}

fn default_name_prefix() -> String {
    "controller_".to_string()
}

fn default_base_port() -> u16 {
    7090
}

fn default_port_search_limit() -> u16 {
    1000
}

fn default_rooms_per_controller() -> usize {
    2
}

fn default_plants_endpoint() -> String {
    "plants".to_string()
}

fn default_devices_endpoint() -> String {
    "devices".to_string()
}

fn default_general_endpoint() -> String {
    "general".to_string()
}

fn default_cu_logger() -> String {
    "CU".to_string()
}

fn default_mqtt_logger() -> String {
    "MQTT".to_string()
}

fn default_topics_update_interval() -> u64 {
    600
}

fn default_mqtt_client_prefix() -> String {
    "smart_care_4ss_controller_".to_string()
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_backoff_initial() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    300
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_state_path() -> PathBuf {
    PathBuf::from("controller_manager_state.json")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7080))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ManagerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CU_MANAGER_*` environment variables (`__` separates nested keys,
    /// e.g. `CU_MANAGER_CONTROLLERS__BASE_PORT=7100`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&ManagerConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CU_MANAGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the reconciler cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.controllers.rooms_per_controller == 0 {
            return Err("controllers.rooms_per_controller must be at least 1".to_string());
        }
        if self.controllers.image.trim().is_empty() {
            return Err("controllers.image must not be empty".to_string());
        }
        if self.controllers.port_search_limit == 0 {
            return Err("controllers.port_search_limit must be at least 1".to_string());
        }
        if self.reconciler.interval_secs == 0 {
            return Err("reconciler.interval_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Catalog URL as handed to controllers
    pub fn controller_catalog_url(&self) -> &str {
        self.controller_env
            .catalog_url
            .as_deref()
            .unwrap_or(&self.catalog.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.controllers.base_port, 7090);
        assert_eq!(config.controllers.rooms_per_controller, 2);
        assert_eq!(config.reconciler.interval_secs, 300);
        assert_eq!(config.controllers.address_mode, AddressMode::ContainerName);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ManagerConfig::default();
        config.controllers.rooms_per_controller = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_controller_catalog_url_falls_back() {
        let mut config = ManagerConfig::default();
        assert_eq!(config.controller_catalog_url(), "http://localhost:8080");
        config.controller_env.catalog_url = Some("http://host.docker.internal:8080".into());
        assert_eq!(
            config.controller_catalog_url(),
            "http://host.docker.internal:8080"
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.toml");
        std::fs::write(
            &path,
            r#"
[controllers]
base_port = 8000
rooms_per_controller = 3
address_mode = "localhost"

[reconciler]
interval_secs = 60
"#,
        )
        .unwrap();

        let config = ManagerConfig::load(path.to_str()).unwrap();
        assert_eq!(config.controllers.base_port, 8000);
        assert_eq!(config.controllers.rooms_per_controller, 3);
        assert_eq!(config.controllers.address_mode, AddressMode::Localhost);
        assert_eq!(config.reconciler.interval_secs, 60);
        // Untouched sections keep their defaults
        assert_eq!(config.catalog.rooms_endpoint, "rooms");
    }
}

//! What a controller container looks like

use crate::config::ManagerConfig;
use crate::runtime::{ContainerSpec, PortMapping};
use cu_types::{ControllerName, RoomId};
use std::collections::BTreeMap;

/// Builds container specs for controllers.
///
/// Controllers boot standalone, so everything they need is passed through
/// their environment.
#[derive(Debug, Clone)]
pub struct ControllerTemplate {
    image: String,
    network: String,
    name_prefix: String,
    mqtt_client_prefix: String,
    base_env: BTreeMap<String, String>,
}

impl ControllerTemplate {
    pub fn from_config(config: &ManagerConfig) -> Self {
        let env = &config.controller_env;
        let catalog = &config.catalog;

        let base_env = [
            ("CATALOG_URL", config.controller_catalog_url().to_string()),
            ("PLANTS_ENDPOINT", env.plants_endpoint.clone()),
            ("DEVICES_ENDPOINT", env.devices_endpoint.clone()),
            ("GENERAL_ENDPOINT", env.general_endpoint.clone()),
            ("SERVICES_ENDPOINT", catalog.services_endpoint.clone()),
            ("ROOMS_ENDPOINT", catalog.rooms_endpoint.clone()),
            ("SERVICE_REGISTRY_NAME", catalog.registry_service_name.clone()),
            ("WEATHER_FORECAST_URL", env.weather_forecast_url.clone()),
            ("WEATHER_FORECAST_API_KEY", env.weather_forecast_api_key.clone()),
            ("BASE_LOGGER", env.base_logger.clone()),
            ("MQTT_LOGGER", env.mqtt_logger.clone()),
            (
                "TOPICS_UPDATE_INTERVAL",
                env.topics_update_interval_secs.to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            image: config.controllers.image.clone(),
            network: config.controllers.network.clone(),
            name_prefix: config.controllers.name_prefix.clone(),
            mqtt_client_prefix: env.mqtt_client_prefix.clone(),
            base_env,
        }
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Deterministic name for a controller serving `rooms`
    pub fn name_for(&self, rooms: &[RoomId]) -> ControllerName {
        ControllerName::for_rooms(&self.name_prefix, rooms)
    }

    /// Environment handed to the controller serving `rooms` on `port`
    pub fn env(&self, rooms: &[RoomId], port: u16) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        env.insert("CU_PORT".to_string(), port.to_string());
        env.insert(
            "MQTT_CLIENT_ID".to_string(),
            format!("{}_{}", self.mqtt_client_prefix, RoomId::join(rooms, "_")),
        );
        env.insert("ROOM_IDS".to_string(), RoomId::join(rooms, ","));
        env
    }

    /// Container spec publishing `port` on the same host port
    pub fn spec(&self, name: &ControllerName, rooms: &[RoomId], port: u16) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            name: name.to_string(),
            network: self.network.clone(),
            env: self.env(rooms, port),
            ports: vec![PortMapping::same(port)],
        }
    }
}

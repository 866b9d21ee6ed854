//! Catalog wire types
//!
//! The catalog (and every controller) answers with the same envelope:
//! `{"success": bool, "status": int, "content": ..., "message": "..."}`.

use crate::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> CatalogResponse<T> {
    pub fn ok(content: T) -> Self {
        Self {
            success: true,
            status: Some(200),
            content: Some(content),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            content: None,
            message: Some(message.into()),
        }
    }
}

/// A room as listed by the catalog. Only the id matters to the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    #[serde(rename = "roomId")]
    pub room_id: RoomId,

    /// Remaining room fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One endpoint of a registered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub method: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Service entry published to (and read from) the catalog's service registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,

    /// Reachable base URL, e.g. `http://controller_1_2:7090`
    pub host: String,

    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceDescriptor {
    /// Build a descriptor from an endpoint-shape template, overriding name and host.
    pub fn from_template(template: &Value, name: &str, host: &str) -> serde_json::Result<Self> {
        let mut object = match template {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        object.insert("name".to_string(), Value::String(name.to_string()));
        object.insert("host".to_string(), Value::String(host.to_string()));
        serde_json::from_value(Value::Object(object))
    }

    /// Find the first endpoint whose path contains `item` and whose method matches
    pub fn find_endpoint(&self, item: &str, method: &str) -> Option<&EndpointSpec> {
        self.endpoints
            .iter()
            .find(|e| e.path.contains(item) && e.method.eq_ignore_ascii_case(method))
    }
}

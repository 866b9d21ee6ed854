//! Controller registration in the catalog's service registry
//!
//! Registration is best-effort. Callers log failures and carry on: a
//! controller that failed to register still serves its rooms.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use cu_types::{CatalogResponse, ControllerName, ServiceDescriptor};
use reqwest::{Client, Response};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Publishes and withdraws controller service entries
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Register `name` as reachable on `port`
    async fn register(&self, name: &ControllerName, port: u16) -> CatalogResult<()>;

    async fn deregister(&self, name: &ControllerName) -> CatalogResult<()>;
}

/// Read the service template a controller entry is built from.
///
/// A missing or malformed template is logged and replaced by an empty object,
/// so entries still carry the controller's name and host.
pub fn load_template(path: Option<&Path>) -> Value {
    let Some(path) = path else {
        return Value::Object(Map::new());
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(value @ Value::Object(_)) => {
            info!(path = %path.display(), "Loaded service template");
            value
        }
        Ok(_) => {
            warn!(path = %path.display(), "Service template is not an object, ignoring it");
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read service template");
            Value::Object(Map::new())
        }
    }
}

/// Registers controllers through the catalog's services endpoint
pub struct CatalogRegistrar {
    client: Client,
    services_url: String,
    template: Value,
}

impl CatalogRegistrar {
    pub fn new(config: &CatalogConfig, template: Value) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config, template))
    }

    pub fn with_client(client: Client, config: &CatalogConfig, template: Value) -> Self {
        Self {
            client,
            services_url: format!(
                "{}/{}",
                config.url.trim_end_matches('/'),
                config.services_endpoint.trim_matches('/')
            ),
            template,
        }
    }

    /// The entry published for a controller
    pub fn descriptor(&self, name: &ControllerName, port: u16) -> CatalogResult<ServiceDescriptor> {
        let host = format!("http://{}:{}", name, port);
        ServiceDescriptor::from_template(&self.template, name.as_str(), &host)
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

async fn check(url: &str, response: Response) -> CatalogResult<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await?;
    let envelope = serde_json::from_str::<CatalogResponse<Value>>(&body)
        .map_err(|e| CatalogError::Decode(format!("{url}: {e}")))?;
    if envelope.success {
        Ok(())
    } else {
        Err(CatalogError::Unsuccessful(
            envelope.message.unwrap_or_else(|| "no message".to_string()),
        ))
    }
}

#[async_trait]
impl ServiceRegistry for CatalogRegistrar {
    #[instrument(skip(self))]
    async fn register(&self, name: &ControllerName, port: u16) -> CatalogResult<()> {
        let descriptor = self.descriptor(name, port)?;
        let response = self
            .client
            .post(&self.services_url)
            .json(&descriptor)
            .send()
            .await?;
        check(&self.services_url, response).await?;
        info!(controller = %name, host = %descriptor.host, "Service registered");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deregister(&self, name: &ControllerName) -> CatalogResult<()> {
        let url = format!("{}/{}", self.services_url, name);
        let response = self.client.delete(&url).send().await?;
        check(&url, response).await?;
        debug!(controller = %name, "Service registration removed");
        Ok(())
    }
}

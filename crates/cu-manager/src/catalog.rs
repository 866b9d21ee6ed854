//! Catalog client: the source of the desired room list

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use cu_types::{CatalogResponse, RoomId, RoomRecord, ServiceDescriptor};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Supplies the rooms that should currently be served, in catalog order
#[async_trait]
pub trait RoomSource: Send + Sync {
    async fn desired_rooms(&self) -> CatalogResult<Vec<RoomId>>;
}

/// HTTP client for the catalog's rooms listing.
///
/// With endpoint discovery on, the rooms path is looked up once in the
/// catalog's own service descriptor and cached for the process lifetime.
pub struct CatalogClient {
    client: Client,
    base_url: String,
    config: CatalogConfig,
    rooms_path: RwLock<Option<String>>,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: CatalogConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            config,
            rooms_path: RwLock::new(None),
        }
    }

    /// Path of the rooms listing, discovered or configured
    async fn rooms_url(&self) -> String {
        if let Some(path) = self.rooms_path.read().await.as_ref() {
            return join_url(&self.base_url, path);
        }

        if self.config.discover_endpoints {
            match self.discover(&self.config.rooms_endpoint, "GET").await {
                Ok(path) => {
                    info!(%path, "Discovered rooms endpoint");
                    *self.rooms_path.write().await = Some(path.clone());
                    return join_url(&self.base_url, &path);
                }
                Err(e) => {
                    warn!(error = %e, "Endpoint discovery failed, using configured rooms path");
                }
            }
        }
        join_url(&self.base_url, &self.config.rooms_endpoint)
    }

    /// Find the path of `item` among the endpoints the registry advertises
    #[instrument(name = "service_discovery", skip(self))]
    pub async fn discover(&self, item: &str, method: &str) -> CatalogResult<String> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            self.config.services_endpoint.trim_matches('/'),
            self.config.registry_service_name
        );
        let services: Vec<ServiceDescriptor> = self.get_envelope(&url).await?;

        services
            .first()
            .and_then(|s| s.find_endpoint(item, method))
            .map(|e| e.path.clone())
            .ok_or_else(|| CatalogError::EndpointNotFound {
                item: item.to_string(),
                method: method.to_string(),
            })
    }

    async fn get_envelope<T: DeserializeOwned + Default>(&self, url: &str) -> CatalogResult<T> {
        debug!(%url, "Querying catalog");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let envelope: CatalogResponse<T> =
            serde_json::from_str(&body).map_err(|e| CatalogError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(CatalogError::Unsuccessful(
                envelope.message.unwrap_or_else(|| "no message".to_string()),
            ));
        }
        Ok(envelope.content.unwrap_or_default())
    }
}

#[async_trait]
impl RoomSource for CatalogClient {
    #[instrument(skip(self))]
    async fn desired_rooms(&self) -> CatalogResult<Vec<RoomId>> {
        let url = self.rooms_url().await;
        info!(%url, "Fetching rooms information");
        let rooms: Vec<RoomRecord> = self.get_envelope(&url).await?;
        Ok(rooms.into_iter().map(|r| r.room_id).collect())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}

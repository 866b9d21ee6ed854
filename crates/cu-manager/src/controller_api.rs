//! Client for a controller's `/rooms` API

use crate::config::AddressMode;
use crate::error::{ControllerApiError, ControllerApiResult};
use crate::runtime::ContainerInfo;
use async_trait::async_trait;
use cu_types::{CatalogResponse, ControllerName, RoomId, RoomsListing, RoomsRequest};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Where a controller's API can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEndpoint {
    pub name: ControllerName,
    pub base_url: String,
}

impl ControllerEndpoint {
    pub fn new(name: ControllerName, base_url: impl Into<String>) -> Self {
        Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Work out the address of a running controller container
    pub fn resolve(info: &ContainerInfo, mode: AddressMode) -> ControllerApiResult<Self> {
        let port = info
            .primary_port()
            .ok_or_else(|| ControllerApiError::NoAddress(info.name.clone()))?;
        let host = match mode {
            AddressMode::ContainerName => info.name.clone(),
            AddressMode::Localhost => "127.0.0.1".to_string(),
            AddressMode::ContainerIp => info
                .ip_address
                .clone()
                .filter(|ip| !ip.is_empty())
                .ok_or_else(|| ControllerApiError::NoAddress(info.name.clone()))?,
        };
        Ok(Self::new(
            ControllerName::new(info.name.clone()),
            format!("http://{}:{}", host, port),
        ))
    }

    fn rooms_url(&self) -> String {
        format!("{}/rooms", self.base_url)
    }
}

/// Room-level operations on a live controller
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Rooms the controller currently serves
    async fn list_rooms(&self, endpoint: &ControllerEndpoint) -> ControllerApiResult<Vec<RoomId>>;

    async fn add_rooms(&self, endpoint: &ControllerEndpoint, rooms: &[RoomId])
        -> ControllerApiResult<()>;

    async fn remove_rooms(
        &self,
        endpoint: &ControllerEndpoint,
        rooms: &[RoomId],
    ) -> ControllerApiResult<()>;
}

/// reqwest implementation of [`ControllerApi`]
#[derive(Debug, Clone)]
pub struct HttpControllerApi {
    client: Client,
}

impl HttpControllerApi {
    pub fn new(timeout: Duration) -> ControllerApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Only a 2xx reply whose body decodes to `success: true` counts as applied
async fn check(url: String, response: Response) -> ControllerApiResult<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(ControllerApiError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(ControllerApiError::Decode(format!(
            "empty response body from {url}"
        )));
    }
    let envelope = serde_json::from_str::<CatalogResponse<Value>>(&body)
        .map_err(|e| ControllerApiError::Decode(format!("{url}: {e}")))?;
    if envelope.success {
        Ok(())
    } else {
        Err(ControllerApiError::Rejected(
            envelope.message.unwrap_or_else(|| "no message".to_string()),
        ))
    }
}

#[async_trait]
impl ControllerApi for HttpControllerApi {
    #[instrument(skip(self), fields(controller = %endpoint.name))]
    async fn list_rooms(&self, endpoint: &ControllerEndpoint) -> ControllerApiResult<Vec<RoomId>> {
        let url = endpoint.rooms_url();
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControllerApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let listing: RoomsListing =
            serde_json::from_str(&body).map_err(|e| ControllerApiError::Decode(e.to_string()))?;
        listing
            .into_rooms()
            .ok_or_else(|| ControllerApiError::Rejected(format!("{} reported failure", url)))
    }

    #[instrument(skip(self), fields(controller = %endpoint.name))]
    async fn add_rooms(
        &self,
        endpoint: &ControllerEndpoint,
        rooms: &[RoomId],
    ) -> ControllerApiResult<()> {
        let url = endpoint.rooms_url();
        debug!(%url, ?rooms, "Adding rooms");
        let body = RoomsRequest {
            rooms: rooms.to_vec(),
        };
        let response = self.client.post(&url).json(&body).send().await?;
        check(url, response).await
    }

    #[instrument(skip(self), fields(controller = %endpoint.name))]
    async fn remove_rooms(
        &self,
        endpoint: &ControllerEndpoint,
        rooms: &[RoomId],
    ) -> ControllerApiResult<()> {
        let url = format!("{}/{}", endpoint.rooms_url(), RoomId::join(rooms, ","));
        debug!(%url, "Removing rooms");
        let response = self.client.delete(&url).send().await?;
        check(url, response).await
    }
}

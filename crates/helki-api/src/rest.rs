//! REST surface of the vendor cloud.
//!
//! Plain request/response calls: the grouped device directory and per-zone
//! status reads/writes. Every call fetches a fresh bearer token from the
//! [`TokenProvider`] collaborator, so token refresh stays out of this crate.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw status/setup object as the cloud serves it.
pub type StatusMap = serde_json::Map<String, Value>;

/// One device row from the grouped directory, enriched with its group.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub dev_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(skip)]
    pub group_id: Option<String>,
    #[serde(skip)]
    pub group_name: Option<String>,
    /// Everything else the directory reports, kept verbatim.
    #[serde(flatten)]
    pub extra: Value,
}

/// One group entry from `grouped_devs`.
#[derive(Debug, Deserialize)]
struct DirectoryGroup {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    devs: Vec<DeviceRecord>,
}

/// HTTP client for the vendor's REST endpoints.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenProvider>,
    serial_id: Option<String>,
}

impl RestClient {
    pub fn new(
        base: Url,
        transport: &TransportConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base,
            tokens,
            serial_id: None,
        })
    }

    /// Attach the vendor's `x-serialid` header to every call.
    pub fn with_serial_id(mut self, serial_id: impl Into<String>) -> Self {
        self.serial_id = Some(serial_id.into());
        self
    }

    // ── Device directory ─────────────────────────────────────────────

    /// List every device across all groups.
    ///
    /// `GET /api/v2/grouped_devs` returns groups with devices nested
    /// inside; the result is flattened with each device carrying its
    /// group's id and name.
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.api_url("api/v2/grouped_devs")?;
        let groups: Vec<DirectoryGroup> = self.get_json(url).await?;

        let mut devices = Vec::new();
        for group in groups {
            for mut dev in group.devs {
                dev.group_id = group.id.clone();
                dev.group_name = group.name.clone();
                devices.push(dev);
            }
        }
        debug!(devices = devices.len(), "device directory fetched");
        Ok(devices)
    }

    // ── Zone status ──────────────────────────────────────────────────

    /// Fetch one zone's status map.
    ///
    /// `GET /api/v2/devs/{dev_id}/acm/{zone}/status`
    pub async fn zone_status(&self, dev_id: &str, zone: u32) -> Result<StatusMap, Error> {
        let url = self.api_url(&format!("api/v2/devs/{dev_id}/acm/{zone}/status"))?;
        self.get_json(url).await
    }

    /// Write status keys to one zone (setpoint, mode, units, ...).
    ///
    /// `POST /api/v2/devs/{dev_id}/acm/{zone}/status`
    pub async fn set_zone_status(
        &self,
        dev_id: &str,
        zone: u32,
        body: &StatusMap,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("api/v2/devs/{dev_id}/acm/{zone}/status"))?;
        let endpoint = url.path().to_owned();
        let resp = self
            .request(reqwest::Method::POST, url)
            .await?
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                endpoint,
            });
        }
        debug!(dev_id, zone, "zone control accepted");
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base.join(path)?)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let token = self.tokens.access_token().await?;
        let mut builder = self.http.request(method, url).bearer_auth(token);
        if let Some(ref serial_id) = self.serial_id {
            builder = builder.header("x-serialid", serial_id);
        }
        Ok(builder)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let endpoint = url.path().to_owned();
        let resp = self
            .request(reqwest::Method::GET, url)
            .await?
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                endpoint,
            });
        }
        Ok(resp.json().await?)
    }
}

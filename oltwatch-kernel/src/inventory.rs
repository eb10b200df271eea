//! Device inventory: fetch the OLT roster and split it by CLI dialect.
//!
//! The roster is fetched fresh on every scan cycle. A failed fetch is an
//! error for the calling job; an empty roster is never substituted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{Device, Dialect, Roster};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inventory endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("inventory payload is not a device list: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("inventory file error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Device>, InventoryError>;
}

/// JSON endpoint serving `[{"ip", "name", "site", "vendor"}, ...]`.
pub struct HttpInventory {
    client: reqwest::Client,
    url: String,
}

impl HttpInventory {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl InventorySource for HttpInventory {
    async fn fetch(&self) -> Result<Vec<Device>, InventoryError> {
        debug!(url = %self.url, "fetching inventory");
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InventoryError::Status(status));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Fixed roster, e.g. loaded from a JSON file for lab setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    devices: Vec<Device>,
}

impl StaticInventory {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, InventoryError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn fetch(&self) -> Result<Vec<Device>, InventoryError> {
        Ok(self.devices.clone())
    }
}

/// Addresses routed to the secondary (Huawei) dialect; everything else is
/// treated as primary (Nokia).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectRules {
    #[serde(default)]
    pub secondary_prefixes: Vec<String>,
    #[serde(default)]
    pub secondary_hosts: Vec<String>,
}

impl Default for DialectRules {
    fn default() -> Self {
        Self {
            secondary_prefixes: vec!["10.90.3.".into()],
            secondary_hosts: vec![
                "10.250.0.178".into(),
                "10.202.160.3".into(),
                "10.80.2.161".into(),
            ],
        }
    }
}

impl DialectRules {
    pub fn dialect_for(&self, host: &str) -> Dialect {
        let secondary = self.secondary_prefixes.iter().any(|p| host.starts_with(p.as_str()))
            || self.secondary_hosts.iter().any(|h| h == host);
        if secondary {
            Dialect::Huawei
        } else {
            Dialect::Nokia
        }
    }
}

/// Drops devices without a management address and splits the rest.
pub fn partition(devices: Vec<Device>, rules: &DialectRules) -> Roster {
    let mut roster = Roster::default();
    for device in devices {
        if device.host.is_empty() {
            continue;
        }
        match rules.dialect_for(&device.host) {
            Dialect::Nokia => roster.primary.push(device),
            Dialect::Huawei => roster.secondary.push(device),
        }
    }
    roster
}

#[derive(Clone)]
pub struct InventoryResolver {
    source: Arc<dyn InventorySource>,
    rules: DialectRules,
}

impl InventoryResolver {
    pub fn new(source: Arc<dyn InventorySource>, rules: DialectRules) -> Self {
        Self { source, rules }
    }

    pub async fn resolve(&self) -> Result<Roster, InventoryError> {
        let devices = self.source.fetch().await?;
        let fetched = devices.len();
        let roster = partition(devices, &self.rules);
        info!(
            fetched,
            primary = roster.primary.len(),
            secondary = roster.secondary.len(),
            "inventory resolved"
        );
        Ok(roster)
    }
}

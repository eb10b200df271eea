//! Core data model: devices, session outcomes and telemetry rows.
//!
//! Device attributes are copied onto every telemetry row at write time; rows
//! never reference a device by foreign key.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::session::SessionError;

/// One OLT as served by the inventory endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub site: String,
    /// Management address, used as the device key everywhere.
    #[serde(rename = "ip", default)]
    pub host: String,
    #[serde(default)]
    pub vendor: String,
}

/// CLI flavour spoken by a device group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Primary group (Nokia ISAM style, `>#` prompt).
    Nokia,
    /// Secondary group (Huawei VRP style, `<name>` prompt).
    Huawei,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Nokia => "nokia",
            Dialect::Huawei => "huawei",
        }
    }
}

/// Inventory partitioned by dialect. Rebuilt on every scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub primary: Vec<Device>,
    pub secondary: Vec<Device>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Reply to a single command inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub text: String,
}

/// Raw text captured from one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    /// All replies joined with newlines.
    pub text: String,
    pub per_command: Vec<CommandOutput>,
}

impl SessionOutput {
    pub fn from_replies(per_command: Vec<CommandOutput>) -> Self {
        let text = per_command
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, per_command }
    }
}

/// Result of polling one device. Consumed immediately, never persisted.
#[derive(Debug)]
pub struct Outcome {
    pub device: Device,
    pub dialect: Dialect,
    pub result: Result<SessionOutput, SessionError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub device: String,
    pub site: String,
    pub host: String,
    pub ont_idx: String,
    pub olt_rx: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntDescription {
    pub device: String,
    pub site: String,
    pub host: String,
    pub ont_idx: String,
    pub desc1: String,
    pub desc2: String,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub slot: String,
    #[serde(rename = "average_pct")]
    pub average: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperature {
    pub slot: String,
    pub sensor_id: i64,
    pub act_temp: i64,
    pub tca_high: i64,
    pub shut_high: i64,
}

/// Latest health of one OLT. Exactly one row per host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OltHealth {
    pub device: String,
    pub site: String,
    pub host: String,
    pub uptime: String,
    pub cpu_loads: Vec<CpuLoad>,
    pub temperatures: Vec<Temperature>,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProtectionRecord {
    pub device: String,
    pub site: String,
    pub host: String,
    pub port: String,
    pub port_state: String,
    pub paired_state: String,
    pub swo_reason: String,
    pub num_swo: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
}

/// Metadata of a configuration backup written to disk. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub device: String,
    pub site: String,
    pub host: String,
    pub file_path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_decodes_inventory_shape() {
        let json = r#"{"ip":"10.1.1.1","name":"OLT-A","site":"North/1","vendor":"nokia"}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.host, "10.1.1.1");
        assert_eq!(device.site, "North/1");
    }

    #[test]
    fn test_session_output_joins_replies() {
        let out = SessionOutput::from_replies(vec![
            CommandOutput { command: "a".into(), text: "one".into() },
            CommandOutput { command: "b".into(), text: "two".into() },
        ]);
        assert_eq!(out.text, "one\ntwo");
        assert_eq!(out.per_command.len(), 2);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials { username: "admin".into(), password: "secret".into() };
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}

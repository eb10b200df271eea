//! Poller configuration: YAML file, `.env`, then environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::dispatch::DEFAULT_MAX_SESSIONS;
use crate::extract::DEFAULT_WEAK_THRESHOLD;
use crate::inventory::DialectRules;
use crate::models::Credentials;

const HOUR: Duration = Duration::from_secs(3600);
const FALLBACK_INTERVAL: Duration = HOUR;

pub const DEFAULT_SSH_COMMAND: &str = "sshpass -e ssh -tt -o StrictHostKeyChecking=no {user}@{host}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub inventory_url: String,
    #[serde(with = "duration_str")]
    pub inventory_timeout: Duration,
    pub ssh_user: String,
    #[serde(skip_serializing)]
    pub ssh_password: String,
    /// Argv template, `{host}` and `{user}` are substituted per device.
    pub ssh_command: String,
    #[serde(with = "duration_str")]
    pub session_timeout: Duration,
    pub max_sessions: usize,
    pub intervals: Intervals,
    /// Fire every job once at startup instead of after the first interval.
    pub run_on_start: bool,
    #[serde(with = "duration_str")]
    pub status_log_interval: Duration,
    pub backup_dir: PathBuf,
    pub data_file: PathBuf,
    pub weak_threshold: f64,
    pub secondary_dialect: DialectRules,
    pub commands: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    #[serde(with = "duration_str")]
    pub power: Duration,
    #[serde(with = "duration_str")]
    pub description: Duration,
    #[serde(with = "duration_str")]
    pub health: Duration,
    #[serde(with = "duration_str")]
    pub port: Duration,
    #[serde(with = "duration_str")]
    pub backup: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub power: String,
    pub description: String,
    pub health: Vec<String>,
    pub port: String,
    pub backup_primary: String,
    pub backup_secondary: String,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            power: 6 * HOUR,
            description: 6 * HOUR,
            health: HOUR,
            port: 2 * HOUR,
            backup: 24 * HOUR,
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            power: "show equipment ont optics".into(),
            description: "show equipment ont status pon".into(),
            health: vec![
                "show system cpu-load detail".into(),
                "show core1-uptime".into(),
                "show equipment temperature".into(),
            ],
            port: "show port-protection".into(),
            backup_primary: "info configure flat".into(),
            backup_secondary: "display current-configuration".into(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            inventory_url: String::new(),
            inventory_timeout: Duration::from_secs(30),
            ssh_user: String::new(),
            ssh_password: String::new(),
            ssh_command: DEFAULT_SSH_COMMAND.into(),
            session_timeout: Duration::from_secs(5 * 60),
            max_sessions: DEFAULT_MAX_SESSIONS,
            intervals: Intervals::default(),
            run_on_start: false,
            status_log_interval: Duration::from_secs(15 * 60),
            backup_dir: PathBuf::from("backups"),
            data_file: PathBuf::from("./data/telemetry.json"),
            weak_threshold: DEFAULT_WEAK_THRESHOLD,
            secondary_dialect: DialectRules::default(),
            commands: Commands::default(),
        }
    }
}

impl PollerConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.ssh_user.clone(),
            password: self.ssh_password.clone(),
        }
    }

    /// Applies the deployment environment variables on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLTS_API_ENV") {
            self.inventory_url = url;
        }
        if let Some(user) = lookup("OLT_SSH_USER") {
            self.ssh_user = user;
        }
        if let Some(pass) = lookup("OLT_SSH_PASS") {
            self.ssh_password = pass;
        }

        let intervals = [
            ("POWER_SCAN_INTERVAL", &mut self.intervals.power),
            ("DESC_SCAN_INTERVAL", &mut self.intervals.description),
            ("HEALTH_SCAN_INTERVAL", &mut self.intervals.health),
            ("PORT_SCAN_INTERVAL", &mut self.intervals.port),
            ("BACKUP_INTERVAL", &mut self.intervals.backup),
            ("OLT_SESSION_TIMEOUT", &mut self.session_timeout),
        ];
        for (name, slot) in intervals {
            if let Some(raw) = lookup(name) {
                *slot = parse_interval(name, &raw);
            }
        }

        if let Some(raw) = lookup("OLT_MAX_SESSIONS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.max_sessions = n,
                Err(e) => tracing::warn!(
                    var = "OLT_MAX_SESSIONS",
                    value = %raw,
                    error = %e,
                    "ignoring invalid session bound"
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inventory_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "inventory URL is empty (set OLTS_API_ENV or inventory_url)".into(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be at least 1".into()));
        }
        let intervals = [
            ("power", self.intervals.power),
            ("description", self.intervals.description),
            ("health", self.intervals.health),
            ("port", self.intervals.port),
            ("backup", self.intervals.backup),
            ("session_timeout", self.session_timeout),
            ("status_log_interval", self.status_log_interval),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Parses a humantime duration; an unparsable value falls back to one hour.
pub fn parse_interval(name: &str, raw: &str) -> Duration {
    match humantime::parse_duration(raw.trim()) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(
                var = name,
                value = raw,
                error = %e,
                fallback = %humantime::format_duration(FALLBACK_INTERVAL),
                "invalid duration, using fallback"
            );
            FALLBACK_INTERVAL
        }
    }
}

/// Reads the YAML file, then `.env` and the process environment.
pub async fn load_config() -> Result<PollerConfig, ConfigError> {
    let _ = dotenvy::dotenv();
    let path = std::env::var("OLTWATCH_CONFIG").unwrap_or_else(|_| "oltwatch.yaml".into());
    let mut cfg = load_file(&path).await?;
    cfg.apply_env(|name| std::env::var(name).ok());
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_file(path: impl AsRef<Path>) -> Result<PollerConfig, ConfigError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    if !path.exists() {
        tracing::info!(path = %shown, "no config file, using defaults");
        return Ok(PollerConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: shown.clone(), source })?;
    if txt.trim().is_empty() {
        return Ok(PollerConfig::default());
    }
    serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse { path: shown, source })
}

/// `Duration` as a humantime string ("6h", "5m") in YAML.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = PollerConfig::default();
        assert_eq!(cfg.intervals.power, Duration::from_secs(6 * 3600));
        assert_eq!(cfg.intervals.port, Duration::from_secs(2 * 3600));
        assert_eq!(cfg.session_timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_sessions, 33);
        assert_eq!(cfg.weak_threshold, -24.0);
        assert!(!cfg.run_on_start);
        assert_eq!(cfg.commands.health.len(), 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = PollerConfig::default();
        cfg.apply_env(env(&[
            ("OLTS_API_ENV", "http://inventory.local/olts"),
            ("OLT_SSH_USER", "isadmin"),
            ("OLT_SSH_PASS", "secret"),
            ("POWER_SCAN_INTERVAL", "30m"),
            ("OLT_MAX_SESSIONS", "4"),
        ]));
        assert_eq!(cfg.inventory_url, "http://inventory.local/olts");
        assert_eq!(cfg.credentials().username, "isadmin");
        assert_eq!(cfg.credentials().password, "secret");
        assert_eq!(cfg.intervals.power, Duration::from_secs(1800));
        assert_eq!(cfg.intervals.description, Duration::from_secs(6 * 3600));
        assert_eq!(cfg.max_sessions, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_bad_interval_falls_back_to_one_hour() {
        let mut cfg = PollerConfig::default();
        cfg.apply_env(env(&[("BACKUP_INTERVAL", "every day")]));
        assert_eq!(cfg.intervals.backup, Duration::from_secs(3600));
    }

    #[test]
    fn test_validate_rejects() {
        let cfg = PollerConfig::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = PollerConfig { inventory_url: "http://x".into(), ..Default::default() };
        cfg.max_sessions = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PollerConfig { inventory_url: "http://x".into(), ..Default::default() };
        cfg.intervals.health = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_file_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oltwatch.yaml");
        std::fs::write(
            &path,
            "inventory_url: http://inv/olts\nintervals:\n  health: 10m\nsecondary_dialect:\n  secondary_prefixes: [\"10.9.\"]\n",
        )
        .unwrap();

        let cfg = load_file(&path).await.unwrap();
        assert_eq!(cfg.inventory_url, "http://inv/olts");
        assert_eq!(cfg.intervals.health, Duration::from_secs(600));
        assert_eq!(cfg.intervals.power, Duration::from_secs(6 * 3600));
        assert_eq!(cfg.secondary_dialect.secondary_prefixes, vec!["10.9.".to_string()]);
        assert!(cfg.secondary_dialect.secondary_hosts.is_empty());
    }

    #[tokio::test]
    async fn test_load_file_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_file(dir.path().join("absent.yaml")).await.unwrap();
        assert!(cfg.inventory_url.is_empty());

        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "intervals: [not, a, map]\n").unwrap();
        assert!(matches!(load_file(&path).await, Err(ConfigError::Parse { .. })));
    }
}

//! Port protection parsing (`show port-protection`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// port, paired-port, port-state, paired-state, swo-reason, num-swo
static PROTECTION_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?P<port>pon:\S+)\s+\S+\s+(?P<state>\S+)\s+(?P<paired>\S+)\s+(?P<reason>\S+)\s+(?P<count>\d+)\s*$",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProtection {
    pub port: String,
    pub port_state: String,
    pub paired_state: String,
    pub swo_reason: String,
    pub num_swo: i64,
}

impl PortProtection {
    /// Either side of the protection pair reports a down condition.
    pub fn is_down(&self) -> bool {
        self.port_state.contains("down") || self.paired_state.contains("down")
    }
}

pub fn extract_port_protection(output: &str) -> Vec<PortProtection> {
    PROTECTION_ROW
        .captures_iter(output)
        .map(|caps| PortProtection {
            port: caps["port"].to_string(),
            port_state: caps["state"].to_string(),
            paired_state: caps["paired"].to_string(),
            swo_reason: caps["reason"].to_string(),
            num_swo: caps["count"].parse().unwrap_or(0),
        })
        .collect()
}

/// Keeps only rows where either state denotes a down condition.
pub fn filter_down(rows: Vec<PortProtection>) -> Vec<PortProtection> {
    rows.into_iter().filter(PortProtection::is_down).collect()
}

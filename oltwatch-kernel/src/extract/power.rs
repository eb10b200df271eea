//! Optics table parsing (`show equipment ont optics`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Receive power below this level (dBm) marks an ONT as weak.
pub const DEFAULT_WEAK_THRESHOLD: f64 = -24.0;

const TABLE_TITLE: &str = "optics table";
const TABLE_SUMMARY: &str = "optics count";
const ROWS_DIVIDER: &str = "--------------+";
const FULL_WIDTH_SEPARATOR: &str =
    "========================================================================================";

static ONT_IDX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:/\d+)+$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntPower {
    pub ont_idx: String,
    pub olt_rx: f64,
}

/// Every row of the optics table whose receive power parses as a float.
pub fn extract_all_ont_power(output: &str) -> Vec<OntPower> {
    let Some(table) = optics_table_section(output) else {
        return Vec::new();
    };

    table_rows(table)
        .filter_map(|fields| {
            if fields.len() < 2 {
                return None;
            }
            let olt_rx = fields[1].parse::<f64>().ok()?;
            Some(OntPower { ont_idx: fields[0].to_string(), olt_rx })
        })
        .collect()
}

/// Rows with receive power strictly below `threshold`.
pub fn extract_ont_power_below(output: &str, threshold: f64) -> Vec<OntPower> {
    extract_all_ont_power(output)
        .into_iter()
        .filter(|p| p.olt_rx < threshold)
        .collect()
}

pub fn extract_ont_idx_below(output: &str, threshold: f64) -> Vec<String> {
    extract_ont_power_below(output, threshold)
        .into_iter()
        .map(|p| p.ont_idx)
        .collect()
}

/// ONT indices (`rack/shelf/slot/port/ont` shape) listed in a table body.
pub fn extract_ont_idx_from_table(table_text: &str) -> Vec<String> {
    table_rows(table_text)
        .filter_map(|fields| fields.first().copied())
        .filter(|idx| ONT_IDX.is_match(idx))
        .map(str::to_string)
        .collect()
}

/// Slice from the table title (or the full-width separator just above it)
/// through the end of the `optics count` line.
fn optics_table_section(output: &str) -> Option<&str> {
    let mut start = output.find(TABLE_TITLE)?;
    if let Some(sep) = output[..start].rfind(FULL_WIDTH_SEPARATOR) {
        start = sep;
    }

    let mut end = start + output[start..].find(TABLE_SUMMARY)?;
    if let Some(nl) = output[end..].find('\n') {
        end += nl + 1;
    }
    Some(&output[start..end])
}

/// Bounded-section scanner: yields whitespace-split fields of each data row
/// between the rows divider and the summary / `====` line.
fn table_rows(table: &str) -> impl Iterator<Item = Vec<&str>> {
    let mut in_rows = false;
    let mut done = false;

    table.lines().filter_map(move |raw| {
        if done {
            return None;
        }
        let line = raw.trim();

        if line.starts_with(ROWS_DIVIDER) {
            in_rows = true;
            return None;
        }
        if !in_rows {
            return None;
        }
        if line.starts_with(TABLE_SUMMARY) || line.starts_with("====") {
            done = true;
            return None;
        }
        if line.is_empty() || line.starts_with('-') {
            return None;
        }
        Some(line.split_whitespace().collect())
    })
}

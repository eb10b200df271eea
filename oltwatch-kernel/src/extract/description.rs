//! ONT description parsing (`show equipment ont status pon`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::normalize_line_endings;

/// pon, ont-idx, sernum, admin, oper, rx power, distance, desc1, desc2...
static STATUS_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*\S+\s+(?P<idx>\S+)\s+\S+\s+\S+\s+\S+\s+(?P<rx>-?\d+(?:\.\d+)?)\s+\S+\s+(?P<desc1>\S+)\s+(?P<desc2>.*)$",
    )
    .unwrap()
});

static WIDE_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntDesc {
    pub ont_idx: String,
    pub desc1: String,
    pub desc2: String,
}

pub fn extract_all_desc(output: &str) -> Vec<OntDesc> {
    let output = normalize_line_endings(output);

    STATUS_ROW
        .captures_iter(&output)
        .map(|caps| {
            let (desc1, desc2) = clean_descriptions(&caps["desc1"], &caps["desc2"]);
            OntDesc { ont_idx: caps["idx"].to_string(), desc1, desc2 }
        })
        .collect()
}

fn clean_descriptions(raw1: &str, raw2: &str) -> (String, String) {
    let desc1 = strip_controls(raw1.trim_matches('"')).trim().to_string();

    let desc2 = raw2.trim_matches('"').trim();
    let desc2 = desc2.strip_suffix("undefined").unwrap_or(desc2).trim();
    let desc2: String = desc2
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\u{fffd}' | '*'))
        .collect();
    let desc2 = desc2.trim_end_matches(['"', ' ']).trim().to_string();

    if desc1.is_empty() {
        return split_shifted(desc1, desc2);
    }
    (desc1, desc2)
}

/// Some firmware leaves desc1 empty and prints both descriptions in the
/// second column, separated by a run of two or more blanks.
fn split_shifted(desc1: String, desc2: String) -> (String, String) {
    let parts: Vec<&str> = WIDE_GAP.splitn(&desc2, 2).collect();
    match parts.as_slice() {
        [first, second] => (
            first.trim_matches('"').to_string(),
            second.trim_matches('"').to_string(),
        ),
        _ => (desc1, desc2),
    }
}

fn strip_controls(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\t' | '\n')).collect()
}

//! Cleanup of `info configure flat` output before it is archived.

use once_cell::sync::Lazy;
use regex::Regex;

static ALARM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\d{2}/\d{2}/\d{2} \d{2}:\d{2}:\d{2} .+ alarm .+$").unwrap()
});

static SPINNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\\|/]{2,}[-\\|/ ]*").unwrap());

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips interleaved alarm log lines and CLI spinner artifacts, collapses
/// long blank runs to a single blank line and trims the document.
pub fn clean_backup_output(raw: &str) -> String {
    let out = ALARM_LINE.replace_all(raw, "");
    let out = SPINNER.replace_all(&out, "");
    let out = BLANK_RUN.replace_all(&out, "\n\n");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_backup_output() {
        let raw = "\n\nconfigure system id OLT-A\n\
24/10/18 09:12:44 minor alarm pon-los raised on 1/1/4/2\n\
\n\n\n\
configure equipment slot lt:1/1/4 planned-type fglt-b\n\
-\\|/-\\|/ \n\
configure qos profiles\n\n";
        let cleaned = clean_backup_output(raw);
        assert_eq!(
            cleaned,
            "configure system id OLT-A\n\nconfigure equipment slot lt:1/1/4 planned-type fglt-b\n\nconfigure qos profiles"
        );
    }

    #[test]
    fn test_single_dash_survives() {
        let raw = "configure vlan id 100 name data-vlan";
        assert_eq!(clean_backup_output(raw), raw);
    }
}

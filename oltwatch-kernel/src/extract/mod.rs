//! Text extraction engine.
//!
//! Every parser here is a pure function over CLI text. A parser that finds
//! nothing returns an empty result; none of them can fail.

pub mod backup;
pub mod description;
pub mod health;
pub mod port_protection;
pub mod power;

pub use backup::clean_backup_output;
pub use description::{extract_all_desc, OntDesc};
pub use health::{extract_health, Health};
pub use port_protection::{extract_port_protection, filter_down, PortProtection};
pub use power::{
    extract_all_ont_power, extract_ont_idx_below, extract_ont_idx_from_table,
    extract_ont_power_below, OntPower, DEFAULT_WEAK_THRESHOLD,
};

/// Decodes raw terminal bytes, dropping invalid UTF-8 sequences entirely
/// instead of substituting replacement characters.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Normalises `\r\n` and lone `\r` line endings to `\n`.
pub(crate) fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lossy_drops_invalid_bytes() {
        let bytes = b"ont\xff\xfe 1/1\xc3\xa9";
        assert_eq!(decode_lossy(bytes), "ont 1/1\u{e9}");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }
}

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::RegionError;

/// A `<td>code</td>` cell immediately followed by its `<td>name</td>` cell.
static CELL_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<td[^>]*>\s*(\d+)\s*</td>\s*<td[^>]*>(.*?)</td>").unwrap()
});

/// `PPCCAA`; anything longer is not an administrative code.
const MAX_CODE_DIGITS: usize = 6;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub code: u32,
    pub name: String,
}

impl RawRecord {
    pub fn new(code: u32, name: impl Into<String>) -> Self {
        RawRecord {
            code,
            name: name.into(),
        }
    }
}

/// Scan markup for code/name cell pairs, in document order.
pub fn extract(html: &str) -> Result<Vec<RawRecord>, RegionError> {
    let mut records = Vec::new();

    for caps in CELL_PAIR_RE.captures_iter(html) {
        let raw_code = &caps[1];
        let code = match raw_code.parse::<u32>() {
            Ok(code) if raw_code.len() <= MAX_CODE_DIGITS => code,
            _ => {
                warn!("Skipping cell with out-of-range code {}", raw_code);
                continue;
            }
        };
        let name = clean_name(&caps[2]);
        if name.is_empty() {
            warn!("Skipping code {} with empty name cell", code);
            continue;
        }
        records.push(RawRecord::new(code, name));
    }

    if records.is_empty() {
        return Err(RegionError::Extraction { bytes: html.len() });
    }
    Ok(records)
}

/// Strip inline decoration (mso-spacerun spans and the like), decode
/// entities, trim ASCII and full-width blanks.
fn clean_name(cell: &str) -> String {
    let stripped = TAG_RE.replace_all(cell, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.trim_matches(char::is_whitespace).to_string()
}

// ── Tests ──

//! Header-merge policy.
//!
//! A batch caller can name a subset of its own headers (comma-separated, case-insensitive) to be
//! propagated into every sub-request. Sub-request-declared headers always win on collision. The
//! merge mutates the spec actually dispatched, so an echoed request reflects exactly the headers
//! that were sent.

use std::collections::HashMap;

/// Parse a comma-separated header-name list into an ordered, lower-cased, de-duplicated set.
/// Entries are trimmed; empty entries are discarded.
pub fn parse_merge_list(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    for entry in raw.split(',') {
        let name = entry.trim().to_ascii_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Overlay selected outer headers onto a sub-request's own headers.
///
/// `outer` is expected to carry lower-cased names (the server extracts them that way). A
/// sub-request header with the same name, in any casing, suppresses the outer value.
pub fn merge_headers(
    own: &mut HashMap<String, String>,
    outer: &HashMap<String, String>,
    names: &[String],
) {
    for name in names {
        let Some(value) = outer.get(name) else {
            continue;
        };
        let declared = own.keys().any(|k| k.eq_ignore_ascii_case(name));
        if !declared {
            own.insert(name.clone(), value.clone());
        }
    }
}

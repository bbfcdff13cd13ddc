//! Database reference normalization.
//!
//! Users paste whatever they have: a full share link, a view URL with query
//! parameters, or a raw id in either the compact or hyphenated form. The
//! store itself only accepts the canonical hyphenated id.

use regex::Regex;
use std::sync::OnceLock;

const ID_PATTERN: &str =
    r"(?i)[0-9a-f]{32}|[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

fn id_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    ID_REGEX.get_or_init(|| Regex::new(ID_PATTERN).expect("static id pattern"))
}

/// Find a database id inside a pasted reference and normalize it to the
/// canonical hyphenated form.
///
/// Returns `None` when the input carries no id at all, which is a
/// user-input problem rather than a store failure and must be reported as
/// such before any network call.
pub fn parse_database_id(link: &str) -> Option<String> {
    id_regex().find(link).map(|found| normalize_id(found.as_str()))
}

/// Lowercase and re-hyphenate a matched id into 8-4-4-4-12 groups. A match
/// whose compact form is not 32 characters is passed through unchanged.
fn normalize_id(value: &str) -> String {
    let compact = value.replace('-', "").to_lowercase();
    if compact.len() != 32 {
        return value.to_lowercase();
    }

    format!(
        "{}-{}-{}-{}-{}",
        &compact[..8],
        &compact[8..12],
        &compact[12..16],
        &compact[16..20],
        &compact[20..32]
    )
}

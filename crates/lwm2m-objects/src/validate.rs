//! Format checks for string resources with custom write semantics.

use regex::Regex;
use std::sync::OnceLock;

/// ISO 8601 UTC offset: "Z", "+02", "+0200" or "+02:00", up to +/-14 hours.
fn utc_offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(Z|[+-](0\d|1[0-4])(:?[0-5]\d)?)$").expect("utc offset regex is valid")
    })
}

/// IANA zone name shape ("UTC", "Europe/Berlin", "America/Argentina/Salta").
fn timezone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_+\-]*(/[A-Za-z0-9_+\-]+)*$")
            .expect("timezone regex is valid")
    })
}

/// Package URI with a scheme the updater can fetch from.
fn package_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)(https?|coaps?)://[^\s/?#]+[^\s]*$").expect("package uri regex is valid")
    })
}

pub fn is_valid_utc_offset(offset: &str) -> bool {
    utc_offset_regex().is_match(offset)
}

pub fn is_valid_timezone(timezone: &str) -> bool {
    timezone_regex().is_match(timezone)
}

pub fn is_valid_package_uri(uri: &str) -> bool {
    package_uri_regex().is_match(uri)
}

//! Cache-header volatility detection.
//!
//! Content the origin marks as not cacheable cannot be pinned: the checksum we
//! compute today would likely not match what a build downloads tomorrow.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use ureq::http::HeaderMap;

/// Why a response was judged volatile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    PragmaNoCache,
    NoStore,
    NoCache,
    ImmediatelyStale,
    Expired,
}

impl fmt::Display for Volatility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::PragmaNoCache => "Pragma: no-cache",
            Self::NoStore => "Cache-Control: no-store",
            Self::NoCache => "Cache-Control: no-cache",
            Self::ImmediatelyStale => "Cache-Control: max-age=0 (immediately stale)",
            Self::Expired => "Expires header indicates already expired content",
        };
        f.write_str(reason)
    }
}

/// Inspect response headers for signals that the content changes between
/// fetches. `None` means the content may be pinned.
///
/// A `Cache-Control` value that does not parse ends the check early with
/// `None`; `Expires` is then not consulted.
pub fn check_cacheability(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Volatility> {
    if let Some(pragma) = joined_header(headers, "pragma") {
        if pragma.to_ascii_lowercase().contains("no-cache") {
            return Some(Volatility::PragmaNoCache);
        }
    }

    if let Some(value) = joined_header(headers, "cache-control") {
        let Ok(directives) = CacheControl::parse(&value) else {
            return None;
        };
        if directives.no_store {
            return Some(Volatility::NoStore);
        }
        if directives.no_cache {
            return Some(Volatility::NoCache);
        }
        if directives.s_maxage.or(directives.max_age) == Some(0) {
            return Some(Volatility::ImmediatelyStale);
        }
    }

    if let Some(expires) = headers.get("expires").and_then(|v| v.to_str().ok()) {
        if parse_http_date(expires).is_some_and(|at| at < now) {
            return Some(Volatility::Expired);
        }
    }

    None
}

/// All values of `name` joined with `", "`, skipping values that are not
/// visible ASCII. `None` when the header is absent or empty.
pub(crate) fn joined_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let joined = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CacheControl {
    no_store: bool,
    no_cache: bool,
    max_age: Option<u64>,
    s_maxage: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
struct MalformedCacheControl;

impl CacheControl {
    fn parse(value: &str) -> Result<Self, MalformedCacheControl> {
        let mut parsed = Self::default();
        for directive in split_directives(value)? {
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim())),
                None => (directive, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "no-store" => parsed.no_store = true,
                // Bare or with a field-name list, both forbid reuse without revalidation.
                "no-cache" => parsed.no_cache = true,
                "max-age" => parsed.max_age = Some(delta_seconds(arg)?),
                "s-maxage" => parsed.s_maxage = Some(delta_seconds(arg)?),
                _ => {}
            }
        }
        Ok(parsed)
    }
}

fn split_directives(value: &str) -> Result<Vec<&str>, MalformedCacheControl> {
    let mut directives = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                directives.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err(MalformedCacheControl);
    }
    directives.push(value[start..].trim());
    directives.retain(|d| !d.is_empty());
    Ok(directives)
}

fn delta_seconds(arg: Option<&str>) -> Result<u64, MalformedCacheControl> {
    let arg = arg.ok_or(MalformedCacheControl)?;
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedCacheControl);
    }
    Ok(arg.parse().unwrap_or(u64::MAX))
}

/// HTTP-date in any of the three formats RFC 9110 requires recipients to accept.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 3] = [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ];
    let value = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

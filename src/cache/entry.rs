//! Cache Entry Module
//!
//! Defines the structure for individual content entries with sliding TTL support.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{CdnError, Result};

/// Header name to every value sent for it, ordered by name.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Format used for `diesAt` records and `Expires` headers (RFC 7231 IMF-fixdate).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// == Cache Entry ==
/// A cached origin response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cache key, the request path
    pub key: String,
    /// Header snapshot taken when the entry was populated
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
    /// Moment after which the entry is treated as absent
    pub dies_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Returns the first value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Returns the first value of `name` in `headers`, ignoring ASCII case.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// Replaces every spelling of `name` in `headers` with a single value.
pub fn set_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), vec![value.into()]);
}

// == Is Expired ==
/// Checks whether something dying at `dies_at` is gone at `now`.
///
/// An entry dies at the instant `dies_at` is reached, not one tick after.
pub fn is_expired_at(dies_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= dies_at
}

// == Utility Functions ==
/// Formats a timestamp as an HTTP date.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Parses an HTTP date written by [`format_http_date`].
pub fn parse_http_date(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, HTTP_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CdnError::Store(format!("invalid diesAt {:?}: {}", raw, e)))
}

/// Returns the HTTP date `window` from now, at whole-second precision.
pub fn http_date_after(window: Duration) -> String {
    format_http_date(Utc::now() + window)
}

//! Cache Module
//!
//! Persistent cache-aside storage with sliding TTL expiry and per-key request
//! coalescing.

mod coalesce;
mod content;
mod context;
mod entry;
mod stats;
mod store;


// Re-export public types
pub use coalesce::Coalescer;
pub use content::{ContentCache, Reap, CONTENT_NAMESPACE, ETAG_SOURCE_HEADER};
pub use context::CacheContext;
pub use entry::{
    format_http_date, header_value, http_date_after, parse_http_date, CacheEntry, Headers,
};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{Namespace, Store};

//! Content Cache Module
//!
//! Cache-aside storage of origin responses with a sliding expiry window.
//!
//! Every cached path owns three records in the `content` namespace:
//! `<path>\0header` (JSON header map), `<path>\0body` (raw bytes) and
//! `<path>\0diesAt` (HTTP date). The three are always written, refreshed and
//! deleted together inside one transaction.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::entry::{
    format_http_date, header_value, is_expired_at, parse_http_date, set_header,
};
use crate::cache::store::{Namespace, Store};
use crate::cache::{CacheContext, CacheEntry, Coalescer, Headers};
use crate::error::{CdnError, Result};
use crate::upstream::Origin;

/// Namespace holding every content entry.
pub const CONTENT_NAMESPACE: &str = "content";

/// Origin header carrying a content hash, surfaced to clients as the ETag.
pub const ETAG_SOURCE_HEADER: &str = "x-bz-content-sha1";

const HEADER_FIELD: &str = "header";
const BODY_FIELD: &str = "body";
const DIES_AT_FIELD: &str = "diesAt";
const FIELD_SEPARATOR: char = '\0';

/// Headers that describe one connection, not the stored representation.
const UNCACHEABLE_HEADERS: [&str; 9] = [
    "connection",
    "content-length",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

enum Lookup {
    Hit { header: Vec<u8>, body: Vec<u8> },
    Expired,
    /// `diesAt` could not be decoded; the records were deleted.
    Corrupt(String),
    Missing,
}

/// What the reclaimer found for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reap {
    Alive,
    Reclaimed(DateTime<Utc>),
    /// The `diesAt` record was unreadable, so the entry was deleted.
    Discarded,
    /// The key has records but no `diesAt`.
    NoExpiry,
}

// == Content Cache ==
#[derive(Clone)]
pub struct ContentCache {
    namespace: Namespace,
    origin: Arc<dyn Origin>,
    flights: Coalescer<CacheEntry>,
    context: Arc<CacheContext>,
    ttl: chrono::Duration,
    fetch_timeout: Duration,
}

impl ContentCache {
    // == Constructor ==
    /// # Arguments
    /// * `store` - Database holding the `content` namespace
    /// * `origin` - Where misses are fetched from
    /// * `context` - Shared counters and ETag index
    /// * `ttl` - Sliding lifetime of an entry
    /// * `fetch_timeout` - Budget for one origin fetch
    pub fn new(
        store: &Store,
        origin: Arc<dyn Origin>,
        context: Arc<CacheContext>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CdnError::Internal(format!("content ttl out of range: {}", e)))?;
        Ok(Self {
            namespace: store.namespace(CONTENT_NAMESPACE)?,
            origin,
            flights: Coalescer::new(),
            context,
            ttl,
            fetch_timeout,
        })
    }

    pub fn context(&self) -> &Arc<CacheContext> {
        &self.context
    }

    // == Get ==
    /// Returns the entry for `key`, fetching it from the origin on a miss.
    ///
    /// Concurrent misses for one key share a single origin fetch.
    pub async fn get(&self, key: &str) -> Result<CacheEntry> {
        match self.load(key) {
            Ok(entry) => return Ok(entry),
            Err(CdnError::NotCached(_)) => {}
            Err(err) => {
                self.context.stats.record_error();
                return Err(err);
            }
        }
        self.context.stats.record_miss();

        let this = self.clone();
        let path = key.to_string();
        let populated = self
            .flights
            .run(key, move || async move { this.populate(&path).await })
            .await?;

        // read back through the hit path; a purge may have raced the write
        match self.load(key) {
            Err(CdnError::NotCached(_)) => Ok(populated),
            other => other,
        }
    }

    async fn populate(&self, key: &str) -> Result<CacheEntry> {
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.origin.fetch(key)).await
        {
            Ok(result) => result,
            Err(_) => Err(CdnError::Timeout(format!(
                "origin fetch for {} exceeded {:?}",
                key, self.fetch_timeout
            ))),
        };
        let response = fetched.inspect_err(|err| {
            self.context.stats.record_error();
            warn!(key, error = %err, "origin fetch failed");
        })?;

        if !response.is_success() {
            self.context.stats.record_error();
            warn!(key, status = response.status, "origin refused request");
            return Err(CdnError::Origin {
                status: response.status,
                message: format!("origin could not serve {}", key),
            });
        }

        let entry = self
            .save(key, response.headers, response.body)
            .inspect_err(|_| self.context.stats.record_error())?;
        self.context.stats.record_load();
        info!(key, bytes = entry.body.len(), dies_at = %entry.dies_at, "cached from origin");
        Ok(entry)
    }

    // == Save ==
    /// Stores `body` under `key` for one full window.
    pub fn save(&self, key: &str, headers: Headers, body: Bytes) -> Result<CacheEntry> {
        self.save_until(key, headers, body, Utc::now() + self.ttl)
    }

    /// Stores `body` under `key` until `dies_at`.
    ///
    /// The header snapshot loses connection-level headers and gains
    /// `Cache-Control`, `Expires` and, when the origin supplied a content
    /// hash, `ETag`.
    pub fn save_until(
        &self,
        key: &str,
        headers: Headers,
        body: Bytes,
        dies_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let dies_at_raw = format_http_date(dies_at);
        let mut headers = snapshot_headers(headers);

        let etag = header_value(&headers, ETAG_SOURCE_HEADER).map(|sum| format!("\"{}\"", sum));
        if let Some(etag) = &etag {
            set_header(&mut headers, "ETag", etag.clone());
        }
        set_header(
            &mut headers,
            "Cache-Control",
            format!("max-age:{}", self.ttl.num_seconds()),
        );
        set_header(&mut headers, "Expires", dies_at_raw.clone());

        let header_json = serde_json::to_vec(&headers)?;
        let [header_key, body_key, dies_key] = field_keys(key);

        self.namespace.transact(|tx| {
            tx.insert(header_key.as_slice(), header_json.as_slice())?;
            tx.insert(body_key.as_slice(), body.as_ref())?;
            tx.insert(dies_key.as_slice(), dies_at_raw.as_bytes())?;
            Ok(())
        })?;

        match &etag {
            Some(etag) => self.context.remember_etag(key, etag),
            None => self.context.forget_etag(key),
        }

        Ok(CacheEntry {
            key: key.to_string(),
            headers,
            body,
            dies_at: parse_http_date(&dies_at_raw)?,
        })
    }

    // == Load ==
    /// Reads `key` from the store and pushes its expiry one window forward.
    ///
    /// An expired entry is deleted in the same transaction that observed it
    /// and reported as [`CdnError::NotCached`]. So is an entry whose expiry
    /// can no longer be read, letting the next request refetch it.
    pub fn load(&self, key: &str) -> Result<CacheEntry> {
        let now = Utc::now();
        let refreshed = format_http_date(now + self.ttl);
        let [header_key, body_key, dies_key] = field_keys(key);

        let lookup = self.namespace.transact(|tx| {
            let Some(raw) = tx.get(dies_key.as_slice())? else {
                return Ok(Lookup::Missing);
            };
            let dies_at = match decode_dies_at(&raw) {
                Ok(dies_at) => dies_at,
                Err(err) => {
                    tx.remove(header_key.as_slice())?;
                    tx.remove(body_key.as_slice())?;
                    tx.remove(dies_key.as_slice())?;
                    return Ok(Lookup::Corrupt(err.to_string()));
                }
            };

            if is_expired_at(dies_at, now) {
                tx.remove(header_key.as_slice())?;
                tx.remove(body_key.as_slice())?;
                tx.remove(dies_key.as_slice())?;
                return Ok(Lookup::Expired);
            }

            let (Some(header), Some(body)) =
                (tx.get(header_key.as_slice())?, tx.get(body_key.as_slice())?)
            else {
                return Ok(Lookup::Missing);
            };

            tx.insert(dies_key.as_slice(), refreshed.as_bytes())?;
            Ok(Lookup::Hit {
                header: header.to_vec(),
                body: body.to_vec(),
            })
        })?;

        match lookup {
            Lookup::Missing => Err(CdnError::NotCached(key.to_string())),
            Lookup::Expired => {
                self.context.stats.record_death(key);
                self.context.forget_etag(key);
                debug!(key, "expired entry dropped on read");
                Err(CdnError::NotCached(key.to_string()))
            }
            Lookup::Corrupt(reason) => {
                self.context.forget_etag(key);
                warn!(key, reason = %reason, "unreadable entry dropped on read");
                Err(CdnError::NotCached(key.to_string()))
            }
            Lookup::Hit { header, body } => {
                let mut headers: Headers = serde_json::from_slice(&header)?;
                set_header(&mut headers, "Expires", refreshed.clone());
                if header_value(&headers, "Content-Type").is_none() && key.ends_with(".svg") {
                    set_header(&mut headers, "Content-Type", "image/svg+xml");
                }
                if let Some(etag) = header_value(&headers, "ETag") {
                    self.context.remember_etag(key, etag);
                }
                self.context.stats.record_hit(key);

                Ok(CacheEntry {
                    key: key.to_string(),
                    headers,
                    body: Bytes::from(body),
                    dies_at: parse_http_date(&refreshed)?,
                })
            }
        }
    }

    // == Purge ==
    /// Deletes every listed key. Absent keys are skipped.
    ///
    /// Returns how many keys were actually present.
    pub fn purge(&self, keys: &[String]) -> Result<usize> {
        let purged = self.namespace.transact(|tx| {
            let mut purged = 0;
            for key in keys {
                let mut present = false;
                for field in field_keys(key) {
                    present |= tx.remove(field)?.is_some();
                }
                if present {
                    purged += 1;
                }
            }
            Ok(purged)
        })?;

        for key in keys {
            self.context.forget_etag(key);
            self.context.stats.forget_path(key);
        }
        info!(requested = keys.len(), purged, "purged content entries");
        Ok(purged)
    }

    // == List Keys ==
    /// Every key with at least one record in the content namespace.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let keys: BTreeSet<String> = self
            .namespace
            .keys()?
            .into_iter()
            .filter_map(|raw| {
                let raw = String::from_utf8(raw).ok()?;
                raw.rsplit_once(FIELD_SEPARATOR)
                    .map(|(key, _)| key.to_string())
            })
            .collect();
        Ok(keys.into_iter().collect())
    }

    // == Reap ==
    /// Deletes `key` if its expiry is at or before `now`.
    pub fn reap_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<Reap> {
        let [header_key, body_key, dies_key] = field_keys(key);

        let reap = self.namespace.transact(|tx| {
            let Some(raw) = tx.get(dies_key.as_slice())? else {
                return Ok(Reap::NoExpiry);
            };
            let Ok(dies_at) = decode_dies_at(&raw) else {
                tx.remove(header_key.as_slice())?;
                tx.remove(body_key.as_slice())?;
                tx.remove(dies_key.as_slice())?;
                return Ok(Reap::Discarded);
            };
            if !is_expired_at(dies_at, now) {
                return Ok(Reap::Alive);
            }
            tx.remove(header_key.as_slice())?;
            tx.remove(body_key.as_slice())?;
            tx.remove(dies_key.as_slice())?;
            Ok(Reap::Reclaimed(dies_at))
        })?;

        match reap {
            Reap::Reclaimed(_) => {
                self.context.stats.record_death(key);
                self.context.forget_etag(key);
            }
            Reap::Discarded => self.context.forget_etag(key),
            Reap::Alive | Reap::NoExpiry => {}
        }
        Ok(reap)
    }
}

fn field_keys(key: &str) -> [Vec<u8>; 3] {
    [HEADER_FIELD, BODY_FIELD, DIES_AT_FIELD]
        .map(|field| format!("{}{}{}", key, FIELD_SEPARATOR, field).into_bytes())
}

fn decode_dies_at(raw: &[u8]) -> Result<DateTime<Utc>> {
    let raw = std::str::from_utf8(raw)
        .map_err(|e| CdnError::Store(format!("diesAt is not utf-8: {}", e)))?;
    parse_http_date(raw)
}

fn snapshot_headers(mut headers: Headers) -> Headers {
    headers.retain(|name, _| {
        !UNCACHEABLE_HEADERS
            .iter()
            .any(|skip| name.eq_ignore_ascii_case(skip))
    });
    headers
}

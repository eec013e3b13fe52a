//! Expiry Reclaim Task
//!
//! Content entries are only dropped on read when a client asks for them, so
//! paths nobody requests again would live forever. This task walks the
//! content namespace on an interval and deletes whatever has expired.
//! Sticker variants and avatars live in their own namespaces and are never
//! visited.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{ContentCache, Reap};

/// Outcome of one sweep over the content namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub scanned: usize,
    pub reclaimed: usize,
    /// Keys whose expiry record was unreadable and were deleted.
    pub discarded: usize,
    /// Keys without an expiry record.
    pub skipped: usize,
    /// Keys the store failed on.
    pub failed: usize,
}

// == Run Pass ==
/// Sweeps every content key once. A failure on one key is logged and the
/// sweep moves on.
pub fn run_pass(cache: &ContentCache) -> ReclaimReport {
    let mut report = ReclaimReport::default();

    let keys = match cache.list_keys() {
        Ok(keys) => keys,
        Err(err) => {
            error!(error = %err, "could not list content keys");
            report.failed += 1;
            return report;
        }
    };

    let now = Utc::now();
    for key in keys {
        report.scanned += 1;
        match cache.reap_if_expired(&key, now) {
            Ok(Reap::Alive) => {}
            Ok(Reap::Reclaimed(dies_at)) => {
                report.reclaimed += 1;
                info!(key = %key, %dies_at, "reclaimed expired entry");
            }
            Ok(Reap::Discarded) => {
                report.discarded += 1;
                warn!(key = %key, "discarded entry with unreadable expiry");
            }
            Ok(Reap::NoExpiry) => {
                report.skipped += 1;
                warn!(key = %key, "entry has no expiry record, skipping");
            }
            Err(err) => {
                report.failed += 1;
                error!(key = %key, error = %err, "could not reclaim entry");
            }
        }
    }

    report
}

/// Spawns the reclaimer. It sleeps `interval`, runs a pass, and repeats
/// until `shutdown` turns true or its sender is dropped.
///
/// # Example
/// ```ignore
/// let (stop, shutdown) = tokio::sync::watch::channel(false);
/// let handle = spawn_reclaim_task(content.clone(), Duration::from_secs(1800), shutdown);
/// // Later, during shutdown:
/// stop.send(true)?;
/// handle.await?;
/// ```
pub fn spawn_reclaim_task(
    cache: ContentCache,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "starting expiry reclaimer");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let report = run_pass(&cache);
            if report.reclaimed > 0 || report.discarded > 0 || report.failed > 0 {
                info!(
                    scanned = report.scanned,
                    reclaimed = report.reclaimed,
                    discarded = report.discarded,
                    skipped = report.skipped,
                    failed = report.failed,
                    "reclaim pass finished"
                );
            } else {
                debug!(scanned = report.scanned, "reclaim pass found nothing");
            }
        }

        info!("expiry reclaimer stopped");
    })
}

//! Image Variant Cache
//!
//! Resized, re-encoded copies of sticker images. A variant depends only on
//! its source image, which never changes, so once encoded it is kept forever.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::cache::{CacheContext, Coalescer, ContentCache, Namespace, Store};
use crate::error::{CdnError, Result};
use crate::media::transcode::{join_error, Transcoder};
use crate::media::VariantFormat;

/// Namespace holding encoded variants.
pub const VARIANT_NAMESPACE: &str = "sticker_cache";

/// Widest variant that will be rendered, in pixels.
pub const MAX_VARIANT_WIDTH: u32 = 256;

// == Variant Key ==
/// Identity of one variant: `subject/attribute/width/format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantKey {
    pub subject: String,
    pub attribute: String,
    pub width: u32,
    pub format: VariantFormat,
}

impl VariantKey {
    /// Builds a key, rejecting widths outside `1..=256` and segments that
    /// could escape the source directory.
    pub fn new(subject: &str, attribute: &str, width: u32, format: VariantFormat) -> Result<Self> {
        if width == 0 || width > MAX_VARIANT_WIDTH {
            return Err(CdnError::Validation(format!(
                "width must be between 1 and {}, got {}",
                MAX_VARIANT_WIDTH, width
            )));
        }
        for segment in [subject, attribute] {
            if segment.is_empty() || segment.contains('/') || segment.contains("..") {
                return Err(CdnError::Validation(format!(
                    "invalid path segment {:?}",
                    segment
                )));
            }
        }
        Ok(Self {
            subject: subject.to_string(),
            attribute: attribute.to_string(),
            width,
            format,
        })
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.subject, self.attribute, self.width, self.format
        )
    }
}

// == Variant Cache ==
#[derive(Clone)]
pub struct VariantCache {
    namespace: Namespace,
    content: ContentCache,
    transcoder: Arc<dyn Transcoder>,
    flights: Coalescer<Bytes>,
    context: Arc<CacheContext>,
    source_prefix: String,
}

impl VariantCache {
    /// # Arguments
    /// * `store` - Database holding the variant namespace
    /// * `content` - Cache the source images are read through
    /// * `transcoder` - Resize and encode routine
    /// * `source_prefix` - Content path prefix of the source images
    pub fn new(
        store: &Store,
        content: ContentCache,
        transcoder: Arc<dyn Transcoder>,
        source_prefix: impl Into<String>,
    ) -> Result<Self> {
        let context = Arc::clone(content.context());
        Ok(Self {
            namespace: store.namespace(VARIANT_NAMESPACE)?,
            content,
            transcoder,
            flights: Coalescer::new(),
            context,
            source_prefix: source_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    /// Content path of the source image for `subject`/`attribute`.
    pub fn source_path(&self, subject: &str, attribute: &str) -> String {
        format!("{}/{}/{}.png", self.source_prefix, subject, attribute)
    }

    // == Resize ==
    /// Returns `subject`/`attribute` scaled to `width` and encoded as `format`.
    pub async fn resize(
        &self,
        subject: &str,
        attribute: &str,
        width: u32,
        format: VariantFormat,
    ) -> Result<Bytes> {
        let key = VariantKey::new(subject, attribute, width, format)?;
        let storage_key = key.storage_key();

        if let Some(hit) = self.namespace.get(&storage_key)? {
            debug!(key = %storage_key, "variant hit");
            return Ok(hit);
        }

        let this = self.clone();
        self.flights
            .run(&storage_key, move || async move { this.render(key).await })
            .await
    }

    async fn render(&self, key: VariantKey) -> Result<Bytes> {
        let storage_key = key.storage_key();
        let source = self
            .content
            .get(&self.source_path(&key.subject, &key.attribute))
            .await?;

        let transcoder = Arc::clone(&self.transcoder);
        let (width, format) = (key.width, key.format);
        let encoded = tokio::task::spawn_blocking(move || {
            transcoder.transcode(&source.body, width, format)
        })
        .await
        .map_err(join_error)
        .and_then(|result| result)
        .inspect_err(|_| self.context.stats.record_error())?;

        self.namespace.insert(&storage_key, &encoded)?;
        self.context.stats.record_conversion(format.as_str());
        info!(key = %storage_key, bytes = encoded.len(), "variant rendered");
        Ok(encoded)
    }

    // == Admin ==
    pub fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .namespace
            .keys()?
            .into_iter()
            .map(|key| String::from_utf8_lossy(&key).into_owned())
            .collect())
    }

    /// Deletes the listed variants; absent keys are skipped.
    pub fn purge(&self, keys: &[String]) -> Result<usize> {
        let mut purged = 0;
        for key in keys {
            if self.namespace.remove(key)? {
                purged += 1;
            }
        }
        info!(requested = keys.len(), purged, "purged variants");
        Ok(purged)
    }
}

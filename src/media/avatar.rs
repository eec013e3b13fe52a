//! Generative Avatar Cache
//!
//! Avatars are produced once per hash by the image generator and kept
//! forever. The hash alone determines the prompt and seed, so a stored
//! avatar is always what a regeneration would have produced.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::cache::{CacheContext, Coalescer, Namespace, Store};
use crate::error::{CdnError, Result};
use crate::media::prompt::{derive_prompt, validate_hash};
use crate::media::transcode::{join_error, reencode_jpeg, sniff_mime_type, AVATAR_JPEG_QUALITY};
use crate::upstream::{GenerationRequest, Generator};

/// Namespace holding generated avatars.
pub const AVATAR_NAMESPACE: &str = "avatars";

const PROMPT_PREFIX: &str = "headshot, portrait, masterpiece, best quality, ";
const NEGATIVE_PROMPT: &str = "person in distance, worst quality, low quality, medium quality, \
    deleted, lowres, comic, bad anatomy, bad hands, text, error, missing fingers, extra digit, \
    fewer digits, cropped, jpeg artifacts, signature, watermark, username, blurry";
const SAMPLER: &str = "DPM++ 2M Karras";
const AVATAR_SIZE: u32 = 256;

/// A served avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct Avatar {
    pub bytes: Bytes,
    pub content_type: &'static str,
    /// True when this request (or one it was coalesced with) generated it.
    pub fresh: bool,
}

/// Builds the generator request for `hash`.
pub fn generation_request(hash: &str) -> Result<GenerationRequest> {
    let derived = derive_prompt(hash)?;
    Ok(GenerationRequest {
        prompt: format!("{}{}", PROMPT_PREFIX, derived.prompt),
        negative_prompt: NEGATIVE_PROMPT.to_string(),
        seed: i64::from(derived.seed),
        sampler_name: SAMPLER.to_string(),
        batch_size: 1,
        n_iter: 1,
        steps: 20,
        cfg_scale: 7,
        width: AVATAR_SIZE,
        height: AVATAR_SIZE,
        s_noise: 1,
        override_settings_restore_afterwards: true,
    })
}

// == Avatar Cache ==
#[derive(Clone)]
pub struct AvatarCache {
    namespace: Namespace,
    generator: Arc<dyn Generator>,
    flights: Coalescer<Bytes>,
    context: Arc<CacheContext>,
    generation_timeout: Duration,
}

impl AvatarCache {
    pub fn new(
        store: &Store,
        generator: Arc<dyn Generator>,
        context: Arc<CacheContext>,
        generation_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            namespace: store.namespace(AVATAR_NAMESPACE)?,
            generator,
            flights: Coalescer::new(),
            context,
            generation_timeout,
        })
    }

    // == Serve Or Generate ==
    /// Returns the stored avatar for `hash`, generating it on first request.
    pub async fn serve_or_generate(&self, hash: &str) -> Result<Avatar> {
        validate_hash(hash)?;

        if let Some(bytes) = self.namespace.get(hash)? {
            debug!(hash, "avatar hit");
            self.context.stats.record_avatar_hit();
            let content_type = sniff_mime_type(&bytes).unwrap_or("image/png");
            return Ok(Avatar {
                bytes,
                content_type,
                fresh: false,
            });
        }

        let this = self.clone();
        let owned = hash.to_string();
        let bytes = self
            .flights
            .run(hash, move || async move { this.generate(&owned).await })
            .await?;

        Ok(Avatar {
            bytes,
            content_type: "image/jpeg",
            fresh: true,
        })
    }

    async fn generate(&self, hash: &str) -> Result<Bytes> {
        let request = generation_request(hash)?;

        let generated =
            match tokio::time::timeout(self.generation_timeout, self.generator.generate(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CdnError::Timeout(format!(
                    "avatar generation for {} exceeded {:?}",
                    hash, self.generation_timeout
                ))),
            }
            .inspect_err(|err| {
                self.context.stats.record_error();
                warn!(hash, error = %err, "avatar generation failed");
            })?;

        let jpeg = tokio::task::spawn_blocking(move || {
            reencode_jpeg(&generated, AVATAR_JPEG_QUALITY)
        })
        .await
        .map_err(join_error)
        .and_then(|result| result)
        .inspect_err(|_| self.context.stats.record_error())?;

        self.namespace.insert(hash, &jpeg)?;
        self.context.stats.record_avatar_creation();
        info!(hash, seed = request.seed, bytes = jpeg.len(), "avatar generated");
        Ok(jpeg)
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

    pub fn purge(&self, keys: &[String]) -> Result<usize> {
        let mut purged = 0;
        for key in keys {
            if self.namespace.remove(key)? {
                purged += 1;
            }
        }
        info!(requested = keys.len(), purged, "purged avatars");
        Ok(purged)
    }
}

//! Image generation collaborator.
//!
//! Speaks the txt2img API of a Stable Diffusion web UI: a JSON request in,
//! base64 encoded images out.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CdnError, Result};

// == Generation Request ==
/// Parameters for a single image generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: u32,
    pub width: u32,
    pub height: u32,
    pub s_noise: u32,
    pub override_settings_restore_afterwards: bool,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    images: Vec<String>,
}

// == Generator Trait ==
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    /// Produces one encoded image for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes>;
}

// == Stable Diffusion Client ==
#[derive(Debug, Clone)]
pub struct StableDiffusionClient {
    client: reqwest::Client,
    base_url: String,
}

impl StableDiffusionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Generator for StableDiffusionClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);
        debug!(%url, seed = request.seed, "requesting generation");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CdnError::Origin {
                status: status.as_u16(),
                message,
            });
        }

        let payload: ImageResponse = response.json().await?;
        decode_first_image(payload)
    }
}

fn decode_first_image(payload: ImageResponse) -> Result<Bytes> {
    let first = payload.images.into_iter().next().ok_or_else(|| CdnError::Origin {
        status: 502,
        message: "generator returned no images".to_string(),
    })?;

    STANDARD
        .decode(first.as_bytes())
        .map(Bytes::from)
        .map_err(|e| CdnError::Codec(format!("generator image is not base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_to_api_field_names() {
        let request = GenerationRequest {
            prompt: "masterpiece".to_string(),
            negative_prompt: "blurry".to_string(),
            seed: 42,
            sampler_name: "DPM++ 2M Karras".to_string(),
            batch_size: 1,
            n_iter: 1,
            steps: 20,
            cfg_scale: 7,
            width: 256,
            height: 256,
            s_noise: 1,
            override_settings_restore_afterwards: true,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sampler_name"], "DPM++ 2M Karras");
        assert_eq!(json["cfg_scale"], 7);
        assert_eq!(json["override_settings_restore_afterwards"], true);
    }

    #[test]
    fn test_decode_first_image() {
        let payload: ImageResponse =
            serde_json::from_str(r#"{"images": ["aGVsbG8=", "d29ybGQ="], "info": "{}"}"#)
                .unwrap();
        assert_eq!(decode_first_image(payload).unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        let empty = ImageResponse { images: vec![] };
        assert!(matches!(
            decode_first_image(empty),
            Err(CdnError::Origin { status: 502, .. })
        ));

        let garbage = ImageResponse {
            images: vec!["***".to_string()],
        };
        assert!(matches!(decode_first_image(garbage), Err(CdnError::Codec(_))));
    }
}

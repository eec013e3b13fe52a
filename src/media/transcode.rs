//! Image decode, resize and encode.
//!
//! Everything here is CPU bound and synchronous; callers run it on the
//! blocking pool.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::{CdnError, Result};
use crate::media::VariantFormat;

/// AVIF encoder quality, 1-100.
const AVIF_QUALITY: u8 = 80;
/// AVIF encoder speed, 1 (slowest) to 10.
const AVIF_SPEED: u8 = 8;
/// JPEG quality for generated avatars.
pub const AVATAR_JPEG_QUALITY: u8 = 75;

// == Transcoder Trait ==
/// Turns a source image into one sized, encoded variant.
pub trait Transcoder: Send + Sync + 'static {
    fn transcode(&self, source: &[u8], width: u32, format: VariantFormat) -> Result<Bytes>;
}

/// Lanczos resampling followed by a fixed high-quality encode per format.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanczosTranscoder;

impl Transcoder for LanczosTranscoder {
    fn transcode(&self, source: &[u8], width: u32, format: VariantFormat) -> Result<Bytes> {
        let img = image::load_from_memory(source)?;
        let resized = resize_to_width(&img, width);
        encode(&resized, format)
    }
}

/// Scales `img` to `width` pixels wide, keeping its aspect ratio.
pub fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let height = (u64::from(img.height()) * u64::from(width) / u64::from(img.width().max(1)))
        .clamp(1, u64::from(u32::MAX)) as u32;
    img.resize_exact(width, height, FilterType::Lanczos3)
}

// == Encode ==
pub fn encode(img: &DynamicImage, format: VariantFormat) -> Result<Bytes> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let mut out = Cursor::new(Vec::new());

    match format {
        VariantFormat::Png => rgba.write_with_encoder(PngEncoder::new_with_quality(
            &mut out,
            CompressionType::Best,
            PngFilter::Adaptive,
        ))?,
        VariantFormat::Webp => rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))?,
        VariantFormat::Avif => rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
            &mut out,
            AVIF_SPEED,
            AVIF_QUALITY,
        ))?,
    }

    Ok(Bytes::from(out.into_inner()))
}

/// Decodes any supported image and re-encodes it as JPEG.
pub fn reencode_jpeg(source: &[u8], quality: u8) -> Result<Bytes> {
    let img = image::load_from_memory(source)?;
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(Bytes::from(out.into_inner()))
}

/// MIME type of an encoded image, sniffed from its leading bytes.
pub fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Maps a join failure of a blocking codec task into a codec error.
pub fn join_error(err: tokio::task::JoinError) -> CdnError {
    CdnError::Codec(format!("codec task failed: {}", err))
}

//! In-memory collaborators shared by unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::Result;
use crate::upstream::{GenerationRequest, Generator, Origin, OriginResponse};

/// Origin serving a fixed set of paths; everything else is a 404.
pub struct FakeOrigin {
    pub calls: AtomicUsize,
    delay: Duration,
    objects: Mutex<HashMap<String, OriginResponse>>,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn serve(&self, path: &str, content_type: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            OriginResponse::ok(content_type, Bytes::copy_from_slice(body)),
        );
    }
}

#[async_trait]
impl Origin for FakeOrigin {
    async fn fetch(&self, path: &str) -> Result<OriginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let found = self.objects.lock().unwrap().get(path).cloned();
        Ok(found.unwrap_or_else(|| OriginResponse {
            status: 404,
            headers: Default::default(),
            body: Bytes::new(),
        }))
    }
}

/// Generator returning a flat PNG and recording every request it saw.
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
    delay: Duration,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay,
        }
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(png_bytes(request.width, request.height))
    }
}

/// A solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 120, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("in-memory png encode");
    Bytes::from(out.into_inner())
}

//! Integration Tests for API Endpoints
//!
//! Drives the full router over a temporary store with in-memory origin and
//! generator backends.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use image::{ImageFormat, Rgba, RgbaImage};
use media_edge::cache::{Headers, Store};
use media_edge::error::{CdnError, Result};
use media_edge::upstream::{GenerationRequest, Generator, Origin, OriginResponse};
use media_edge::{create_router, AppState, Config};
use serde_json::Value;
use tower::ServiceExt;

const AVATAR_HASH: &str = "deadbeefcafebabe0123456789abcde0";
const STICKER_SOURCE: &str = "/file/static/stickers/aoi/yawn.png";

// == Fakes ==

struct CountingOrigin {
    calls: AtomicUsize,
    objects: Mutex<HashMap<String, OriginResponse>>,
}

impl CountingOrigin {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn serve(&self, path: &str, response: OriginResponse) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }
}

#[async_trait]
impl Origin for CountingOrigin {
    async fn fetch(&self, path: &str) -> Result<OriginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // long enough for concurrent callers to pile up behind one fetch
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| OriginResponse {
                status: 404,
                headers: Headers::new(),
                body: Bytes::new(),
            }))
    }
}

struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(png(request.width, request.height))
    }
}

fn png(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 90, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

// == Helper Functions ==

struct Harness {
    app: Router,
    state: AppState,
    origin: Arc<CountingOrigin>,
    generator: Arc<CountingGenerator>,
    _store: Store,
}

impl Harness {
    fn new() -> Self {
        let store = Store::temporary().unwrap();
        let origin = Arc::new(CountingOrigin::new());
        origin.serve(STICKER_SOURCE, OriginResponse::ok("image/png", png(512, 512)));
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(
            &store,
            origin.clone(),
            generator.clone(),
            &Config::default(),
        )
        .unwrap();

        Self {
            app: create_router(state.clone()),
            state,
            origin,
            generator,
            _store: store,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn get_sticker_webp(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::ACCEPT, "image/webp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post(&self, uri: &str, body: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn stats(&self) -> Value {
        body_to_json(self.get("/stats").await.into_body()).await
    }

    fn origin_calls(&self) -> usize {
        self.origin.calls.load(Ordering::SeqCst)
    }
}

async fn body_bytes(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}

async fn body_to_json(body: Body) -> Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// == Sticker Scenarios ==

#[tokio::test]
async fn test_cold_sticker_request_renders_webp_once() {
    let harness = Harness::new();

    let response = harness.get_sticker_webp("/sticker/aoi/yawn/128").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/webp");
    assert_eq!(header_str(&response, header::CACHE_CONTROL), "max-age:604800");
    assert!(header_str(&response, header::ETAG).starts_with("W/\""));
    let bytes = body_bytes(response.into_body()).await;
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        ImageFormat::WebP
    );

    assert_eq!(harness.origin_calls(), 1);
    let stats = harness.stats().await;
    assert_eq!(stats["conversions"]["webp"], 1);
    assert_eq!(
        harness.state.variants.list_keys().unwrap(),
        vec!["aoi/yawn/128/webp".to_string()]
    );
}

#[tokio::test]
async fn test_repeated_sticker_request_is_a_hit() {
    let harness = Harness::new();

    let first = harness.get_sticker_webp("/sticker/aoi/yawn/128").await;
    let first_etag = header_str(&first, header::ETAG).to_string();
    let first = body_bytes(first.into_body()).await;
    let second = harness.get_sticker_webp("/sticker/aoi/yawn/128").await;
    assert_eq!(header_str(&second, header::ETAG), first_etag);
    let second = body_bytes(second.into_body()).await;

    assert_eq!(first, second);
    assert_eq!(harness.origin_calls(), 1);
    assert_eq!(harness.stats().await["conversions"]["webp"], 1);
}

#[tokio::test]
async fn test_concurrent_sticker_requests_render_once() {
    let harness = Arc::new(Harness::new());

    let mut handles = Vec::new();
    for _ in 0..12 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            let response = harness.get_sticker_webp("/sticker/aoi/yawn/96").await;
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response.into_body()).await
        }));
    }
    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(harness.origin_calls(), 1);
    assert_eq!(harness.stats().await["conversions"]["webp"], 1);
}

#[tokio::test]
async fn test_purged_variant_is_rendered_again() {
    let harness = Harness::new();
    harness.get_sticker_webp("/sticker/aoi/yawn/128").await;

    let purge = harness
        .post("/admin/sticker/purge", r#"["aoi/yawn/128/webp"]"#)
        .await;
    assert_eq!(purge.status(), StatusCode::OK);
    assert!(body_bytes(purge.into_body()).await.is_empty());
    assert!(harness.state.variants.list_keys().unwrap().is_empty());

    let response = harness.get_sticker_webp("/sticker/aoi/yawn/128").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(harness.stats().await["conversions"]["webp"], 2);
    // the source image is still cached, so the origin is not asked again
    assert_eq!(harness.origin_calls(), 1);
}

#[tokio::test]
async fn test_sticker_defaults_to_png() {
    let harness = Harness::new();

    let response = harness.get("/sticker/aoi/yawn/32").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/png");
}

#[tokio::test]
async fn test_sticker_width_out_of_range() {
    let harness = Harness::new();

    for uri in ["/sticker/aoi/yawn/0", "/sticker/aoi/yawn/257", "/sticker/aoi/yawn/wide"] {
        let response = harness.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_to_json(response.into_body()).await;
        assert!(json.get("error").is_some());
    }
    assert_eq!(harness.origin_calls(), 0);
}

#[tokio::test]
async fn test_sticker_missing_source_is_not_found() {
    let harness = Harness::new();

    let response = harness.get("/sticker/aoi/snore/64").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(harness.state.variants.list_keys().unwrap().is_empty());
}

// == Avatar Scenarios ==

#[tokio::test]
async fn test_avatar_generated_once_then_served() {
    let harness = Harness::new();
    let uri = format!("/avatar/{}", AVATAR_HASH);

    let first = harness.get(&uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, header::CONTENT_TYPE), "image/jpeg");
    assert_eq!(header_str(&first, header::CACHE_CONTROL), "max-age:2630000");
    let first = body_bytes(first.into_body()).await;

    let second = harness.get(&uri).await;
    assert_eq!(header_str(&second, header::CONTENT_TYPE), "image/jpeg");
    let second = body_bytes(second.into_body()).await;

    assert_eq!(first, second);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 1);
    let stats = harness.stats().await;
    assert_eq!(stats["avatar_creations"], 1);
    assert_eq!(stats["avatar_hits"], 1);
}

#[tokio::test]
async fn test_avatar_rejects_bad_hashes() {
    let harness = Harness::new();

    for hash in ["not-hex!", &AVATAR_HASH[..31], "DEADBEEFCAFEBABE0123456789ABCDE0"] {
        let response = harness.get(&format!("/avatar/{}", hash)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", hash);
    }
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 0);
}

// == File Scenarios ==

#[tokio::test]
async fn test_file_fetch_through_and_conditional_get() {
    let harness = Harness::new();
    let mut response = OriginResponse::ok("text/plain", Bytes::from_static(b"hello"));
    response
        .headers
        .insert("X-Bz-Content-Sha1".to_string(), vec!["0a1b2c".to_string()]);
    harness.origin.serve("/file/static/hello.txt", response);

    let first = harness.get("/file/static/hello.txt").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, header::CONTENT_TYPE), "text/plain");
    assert_eq!(header_str(&first, header::ETAG), "\"0a1b2c\"");
    assert_eq!(header_str(&first, header::CACHE_CONTROL), "max-age:604800");
    assert_eq!(body_bytes(first.into_body()).await, Bytes::from_static(b"hello"));

    let conditional = harness
        .send(
            Request::builder()
                .uri("/file/static/hello.txt")
                .header(header::IF_NONE_MATCH, "\"0a1b2c\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(conditional.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_str(&conditional, header::ETAG), "\"0a1b2c\"");

    let again = harness.get("/file/static/hello.txt").await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(harness.origin_calls(), 1);
}

#[tokio::test]
async fn test_file_origin_miss_is_not_found() {
    let harness = Harness::new();

    let response = harness.get("/file/static/missing.txt").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let listing = body_to_json(harness.get("/admin/file/files").await.into_body()).await;
    assert_eq!(listing, serde_json::json!([]));
}

#[tokio::test]
async fn test_expired_entry_is_a_miss_and_unlisted() {
    let harness = Harness::new();
    let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
    harness
        .state
        .content
        .save_until(
            "/file/static/stale.txt",
            Headers::new(),
            Bytes::from_static(b"stale"),
            an_hour_ago,
        )
        .unwrap();

    assert!(matches!(
        harness.state.content.load("/file/static/stale.txt"),
        Err(CdnError::NotCached(_))
    ));
    let listing = body_to_json(harness.get("/admin/file/files").await.into_body()).await;
    assert_eq!(listing, serde_json::json!([]));
    assert_eq!(harness.stats().await["deaths"], 1);
}

// == Admin Endpoints ==

#[tokio::test]
async fn test_admin_listing_per_namespace() {
    let harness = Harness::new();
    harness.get("/sticker/aoi/yawn/16").await;

    let files = body_to_json(harness.get("/admin/file/files").await.into_body()).await;
    assert_eq!(files, serde_json::json!([STICKER_SOURCE]));

    let stickers = body_to_json(harness.get("/admin/sticker/files").await.into_body()).await;
    assert_eq!(stickers, serde_json::json!(["aoi/yawn/16/png"]));

    let avatars = body_to_json(harness.get("/admin/avatar/files").await.into_body()).await;
    assert_eq!(avatars, serde_json::json!([]));

    assert_eq!(
        harness.get("/admin/nope/files").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_purge_endpoint_errors() {
    let harness = Harness::new();

    assert_eq!(
        harness.post("/admin/file/purge", "{oops").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        harness.get("/admin/file/purge").await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
        harness.post("/admin/nope/purge", "[]").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new();

    let response = harness.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

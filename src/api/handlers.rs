//! API Handlers
//!
//! HTTP request handlers for each media edge endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use md5::{Digest, Md5};
use tracing::debug;

use crate::cache::{http_date_after, CacheContext, ContentCache, Headers, Store};
use crate::config::Config;
use crate::error::{CdnError, Result};
use crate::media::{AvatarCache, LanczosTranscoder, VariantCache, VariantFormat};
use crate::models::{AdminNamespace, HealthResponse, PurgeRequest, StatsResponse};
use crate::upstream::{Generator, HttpOrigin, Origin, StableDiffusionClient};

const STICKER_CACHE_CONTROL: &str = "max-age:604800";
const STICKER_LIFETIME_DAYS: i64 = 7;
const AVATAR_CACHE_CONTROL: &str = "max-age:2630000";
const AVATAR_LIFETIME_DAYS: i64 = 30;

/// Application state shared across all handlers.
///
/// Every component is cheap to clone; clones share the same store trees,
/// in-flight maps and counters.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub content: ContentCache,
    pub variants: VariantCache,
    pub avatars: AvatarCache,
    pub context: Arc<CacheContext>,
}

impl AppState {
    /// Wires the caches over `store` with the given collaborators.
    pub fn new(
        store: &Store,
        origin: Arc<dyn Origin>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Result<Self> {
        let context = Arc::new(CacheContext::new());
        let content = ContentCache::new(
            store,
            origin,
            Arc::clone(&context),
            config.content_ttl(),
            config.origin_timeout(),
        )?;
        let variants = VariantCache::new(
            store,
            content.clone(),
            Arc::new(LanczosTranscoder),
            config.sticker_source_prefix.clone(),
        )?;
        let avatars = AvatarCache::new(
            store,
            generator,
            Arc::clone(&context),
            config.generation_timeout(),
        )?;

        Ok(Self {
            store: store.clone(),
            content,
            variants,
            avatars,
            context,
        })
    }

    /// Creates an AppState talking HTTP to the configured origin and
    /// generation backend.
    pub fn from_config(store: &Store, config: &Config) -> Result<Self> {
        let origin = HttpOrigin::new(config.origin_url.clone(), config.origin_timeout())?;
        let generator =
            StableDiffusionClient::new(config.generator_url.clone(), config.generation_timeout())?;
        Self::new(store, Arc::new(origin), Arc::new(generator), config)
    }

    fn list_keys(&self, namespace: AdminNamespace) -> Result<Vec<String>> {
        match namespace {
            AdminNamespace::File => self.content.list_keys(),
            AdminNamespace::Sticker => self.variants.list_keys(),
            AdminNamespace::Avatar => self.avatars.list_keys(),
        }
    }
}

/// Handler for GET /file/*path
///
/// Serves the cached origin response, fetching it on a miss. A matching
/// `If-None-Match` is answered with 304 without reading the store.
pub async fn file_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = format!("/file/{}", path);

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if state.context.matches_etag(&key, if_none_match) {
            debug!(key = %key, "etag matched");
            let mut out = HeaderMap::new();
            if let Some(etag) = state.context.etag_for(&key) {
                if let Ok(value) = HeaderValue::from_str(&etag) {
                    out.insert(header::ETAG, value);
                }
            }
            return Ok((StatusCode::NOT_MODIFIED, out).into_response());
        }
    }

    let entry = state.content.get(&key).await?;
    Ok((to_header_map(&entry.headers), entry.body).into_response())
}

/// Handler for GET /sticker/:subject/:attribute/:width
pub async fn sticker_handler(
    State(state): State<AppState>,
    Path((subject, attribute, width)): Path<(String, String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response> {
    let width: u32 = width
        .parse()
        .map_err(|_| CdnError::Validation(format!("width {:?} is not a number", width)))?;
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = VariantFormat::negotiate(accept);

    let bytes = state
        .variants
        .resize(&subject, &attribute, width, format)
        .await?;

    let etag = format!("W/\"{:x}\"", Md5::digest(uri.path().as_bytes()));
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CACHE_CONTROL, STICKER_CACHE_CONTROL.to_string()),
            (
                header::EXPIRES,
                http_date_after(chrono::Duration::days(STICKER_LIFETIME_DAYS)),
            ),
            (header::ETAG, etag),
            (header::VARY, "Accept".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Handler for GET /avatar/:hash
pub async fn avatar_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response> {
    let avatar = state.avatars.serve_or_generate(&hash).await?;

    Ok((
        [
            (header::CONTENT_TYPE, avatar.content_type.to_string()),
            (header::CACHE_CONTROL, AVATAR_CACHE_CONTROL.to_string()),
            (
                header::EXPIRES,
                http_date_after(chrono::Duration::days(AVATAR_LIFETIME_DAYS)),
            ),
        ],
        avatar.bytes,
    )
        .into_response())
}

/// Handler for GET /admin/:namespace/files
///
/// Lists every key stored in the namespace.
pub async fn list_files_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<Vec<String>>> {
    let namespace: AdminNamespace = namespace.parse()?;
    Ok(Json(state.list_keys(namespace)?))
}

/// Handler for POST /admin/:namespace/purge
///
/// Takes the raw body so malformed JSON is reported as 400.
pub async fn purge_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    body: Bytes,
) -> Result<StatusCode> {
    let namespace: AdminNamespace = namespace.parse()?;
    let request = PurgeRequest::parse(&body)?;

    match namespace {
        AdminNamespace::File => state.content.purge(&request.keys)?,
        AdminNamespace::Sticker => state.variants.purge(&request.keys)?,
        AdminNamespace::Avatar => state.avatars.purge(&request.keys)?,
    };
    Ok(StatusCode::OK)
}

/// Handler for GET /stats
///
/// Returns current counters, per-namespace entry counts and the names of the
/// store's namespaces.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let mut entries = BTreeMap::new();
    for namespace in [
        AdminNamespace::File,
        AdminNamespace::Sticker,
        AdminNamespace::Avatar,
    ] {
        entries.insert(namespace.to_string(), state.list_keys(namespace)?.len());
    }

    Ok(Json(StatsResponse::new(
        state.context.stats.snapshot(),
        entries,
        state.store.namespace_names(),
    )))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Converts a stored header snapshot into response headers, dropping any
/// name or value that is not valid on the wire.
fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, values) in headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                out.append(name.clone(), value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGenerator, FakeOrigin};

    fn test_state() -> AppState {
        let store = Store::temporary().unwrap();
        AppState::new(
            &store,
            Arc::new(FakeOrigin::new()),
            Arc::new(FakeGenerator::new()),
            &Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_to_header_map_keeps_every_value() {
        let mut headers = Headers::new();
        headers.insert(
            "Set-Cookie".to_string(),
            vec!["a=1".to_string(), "b=2".to_string()],
        );
        headers.insert("Bad Name".to_string(), vec!["x".to_string()]);

        let map = to_header_map(&headers);

        assert_eq!(map.get_all("set-cookie").iter().count(), 2);
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_list_files_unknown_namespace() {
        let state = test_state();
        let result = list_files_handler(State(state), Path("bogus".to_string())).await;
        assert!(matches!(result, Err(CdnError::UnknownNamespace(_))));
    }

    #[tokio::test]
    async fn test_purge_handler_rejects_malformed_body() {
        let state = test_state();
        let result = purge_handler(
            State(state),
            Path("file".to_string()),
            Bytes::from_static(b"{not json"),
        )
        .await;
        assert!(matches!(result, Err(CdnError::Validation(_))));
    }

    #[tokio::test]
    async fn test_purge_then_list() {
        let state = test_state();
        state
            .content
            .save("/file/a", Headers::new(), Bytes::from_static(b"x"))
            .unwrap();

        let status = purge_handler(
            State(state.clone()),
            Path("file".to_string()),
            Bytes::from_static(br#"["/file/a"]"#),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);

        let Json(keys) = list_files_handler(State(state), Path("file".to_string()))
            .await
            .unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_stats_lists_store_namespaces() {
        let state = test_state();
        state
            .content
            .save("/file/a", Headers::new(), Bytes::from_static(b"x"))
            .unwrap();

        let Json(stats) = stats_handler(State(state)).await.unwrap();

        assert_eq!(stats.namespaces, vec!["avatars", "content", "sticker_cache"]);
        assert_eq!(stats.entries["file"], 1);
        assert_eq!(stats.entries["sticker"], 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(health) = health_handler().await;
        assert_eq!(health.status, "healthy");
    }
}

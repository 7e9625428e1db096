//! Rendition serving and generation.
//!
//! Image routes pack dimensions and extension into one path segment, so
//! they are dispatched from the router fallback rather than axum path
//! patterns. GET serves (generating on miss), HEAD answers existence
//! only, POST hands off to the upload coordinator.

use crate::bounds;
use crate::error::{ApiError, ApiResult};
use crate::handlers::uploads;
use crate::metrics;
use crate::params::{self, QueryParams};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, EXPIRES, LOCATION};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use darkroom_core::EXPIRES_YEARS;
use darkroom_core::request::{Fit, ImageRequest, QUALITY_AUTO, RenditionKey};
use darkroom_imaging::RenderTarget;
use futures::TryStreamExt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

/// Header explaining why a request was redirected.
const X_REDIRECT_INFO: &str = "x-redirect-info";

/// Fallback handler for image-pattern routes, since axum doesn't support
/// /{param}.suffix patterns.
pub async fn image_fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let query = Query::<QueryParams>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();

    let method = req.method().clone();
    if method == Method::GET {
        match serve(&state, &path, &query, false).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    } else if method == Method::HEAD {
        match serve(&state, &path, &query, true).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    } else if method == Method::POST {
        match uploads::upload(state, &path, &query, req).await {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response(),
        }
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

async fn serve(
    state: &AppState,
    path: &str,
    query: &QueryParams,
    head_only: bool,
) -> ApiResult<Response> {
    let request = params::resolve(path, query)?;

    // HEAD is an existence probe: no generation, no redirects.
    if head_only {
        return if state.originals.exists(&request.name).await {
            Ok(StatusCode::OK.into_response())
        } else {
            Ok(StatusCode::NOT_FOUND.into_response())
        };
    }

    if !state.originals.exists(&request.name).await {
        return Err(ApiError::NotFound(format!(
            "image not found: {}",
            request.name
        )));
    }

    if request.is_original_size() && !query.has_filters() {
        return serve_original(state, &request).await;
    }

    // Resolve missing dimensions from the source's natural size.
    let (width, height) = match (request.width, request.height) {
        (Some(w), Some(h)) => (w, h),
        _ => {
            let dims = bounds::natural_size(state, &request.name).await?;
            (
                request.width.unwrap_or(dims.width),
                request.height.unwrap_or(dims.height),
            )
        }
    };

    let constraints = &state.config.constraints;
    let clamped = bounds::clamp(
        width,
        height,
        request.fit,
        constraints.max_width,
        constraints.max_height,
    );

    let request = ImageRequest {
        width: Some(clamped.width),
        height: Some(clamped.height),
        ..request
    };

    if clamped.clamped {
        return Ok(redirect_to_canonical(&request, width, height));
    }

    let key = RenditionKey::from_request(&request)
        .ok_or_else(|| ApiError::Internal("rendition key missing dimensions".to_string()))?;

    if let Some(url) = state.cache.lookup(&key).await {
        return deliver_cached(state, &url).await;
    }
    metrics::CACHE_MISSES.inc();

    generate(state, &request, key).await
}

/// Render a rendition, answer with its bytes, and record/publish it in
/// the background so a client disconnect cannot abort the cache fill.
async fn generate(state: &AppState, request: &ImageRequest, key: RenditionKey) -> ApiResult<Response> {
    let source = state.originals.read(&request.name).await?;
    let target = RenderTarget::new(
        request,
        key.width,
        key.height,
    );

    let timer = metrics::GENERATION_DURATION.start_timer();
    let rendered = state.imaging.render(Bytes::from(source), target).await?;
    timer.observe_duration();
    metrics::RENDITIONS_GENERATED.inc();

    let rendered_at = OffsetDateTime::now_utc();
    info!(key = %key, bytes = rendered.len(), "rendition generated");

    {
        let state = state.clone();
        let key = key.clone();
        let rendered = rendered.clone();
        let mime = request.format.mime();
        tokio::spawn(async move {
            publish(&state, &key, rendered, mime, rendered_at).await;
        });
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, request.format.mime())
        .header(CACHE_CONTROL, "public")
        .header(EXPIRES, far_future_expires(rendered_at))
        .body(Body::from(rendered))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Upload the rendition object and record it in the cache tiers.
async fn publish(
    state: &AppState,
    key: &RenditionKey,
    rendered: Bytes,
    mime: &str,
    rendered_at: OffsetDateTime,
) {
    let stamp = rendered_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| rendered_at.unix_timestamp().to_string());
    // Timestamp-prefixed keys keep re-renders of the same rendition from
    // colliding in object storage.
    let object_key = format!("{stamp}_{}", key.token());

    match state.renditions.put(&object_key, rendered, mime).await {
        Ok(url) => state.cache.store(key, &url, rendered_at).await,
        Err(err) => {
            warn!(key = %key, error = %err, "failed to publish rendition, will regenerate next time");
        }
    }
}

/// Answer a cache hit: a 303 to the published URL, or proxy it through
/// when the deployment hides the object store from clients.
async fn deliver_cached(state: &AppState, url: &str) -> ApiResult<Response> {
    if !state.config.server.proxy_renditions {
        let mut builder = Response::builder()
            .status(StatusCode::SEE_OTHER)
            .header(LOCATION, url);
        if let Some(max_age) = state.config.server.redirect_cache_max_age_secs {
            builder = builder.header(CACHE_CONTROL, format!("max-age={max_age}"));
        }
        return builder
            .body(Body::empty())
            .map_err(|err| ApiError::Internal(err.to_string()));
    }

    let upstream = state
        .http
        .get(url)
        .send()
        .await
        .map_err(|err| ApiError::Internal(format!("rendition proxy failed: {err}")))?;
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let stream = upstream
        .bytes_stream()
        .map_err(|err| std::io::Error::other(err.to_string()));

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, "public")
        .body(Body::from_stream(stream))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Serve a stored original untouched.
async fn serve_original(state: &AppState, request: &ImageRequest) -> ApiResult<Response> {
    let path = state.originals.path(&request.name)?;
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("image not found: {}", request.name)))?;
    let bytes = state.originals.read(&request.name).await?;

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let etag = format!("\"{}-{}\"", meta.len(), mtime);

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, request.format.mime())
        .header(CACHE_CONTROL, "public")
        .header(ETAG, etag)
        .body(Body::from(bytes))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// 303 to the canonical in-bounds URL for an over-limit request.
fn redirect_to_canonical(request: &ImageRequest, asked_w: u32, asked_h: u32) -> Response {
    let location = canonical_url(request);
    let info = format!(
        "requested {}x{} exceeds limits, serving {}x{}",
        asked_w,
        asked_h,
        request.width.unwrap_or(0),
        request.height.unwrap_or(0),
    );
    (
        StatusCode::SEE_OTHER,
        [
            (LOCATION.as_str(), location.as_str()),
            (X_REDIRECT_INFO, info.as_str()),
        ],
    )
        .into_response()
}

/// Canonical URL for a fully-dimensioned request.
fn canonical_url(request: &ImageRequest) -> String {
    let mut url = format!(
        "/{}_{}_{}.{}",
        request.name,
        request.width.unwrap_or(0),
        request.height.unwrap_or(0),
        request.format.extension(),
    );
    let mut query = Vec::new();
    if request.fit != Fit::Clip {
        query.push(format!("fit={}", request.fit));
    }
    if request.blur.is_some() {
        query.push("blur=true".to_string());
    }
    if request.quality != QUALITY_AUTO {
        query.push(format!("quality={}", request.quality));
    }
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    url
}

/// Far-future Expires header value.
fn far_future_expires(now: OffsetDateTime) -> String {
    let expires = now + time::Duration::days(365 * EXPIRES_YEARS as i64);
    expires
        .format(&time::format_description::well_known::Rfc2822)
        .map(|s| s.replace("+0000", "GMT"))
        .unwrap_or_else(|_| expires.unix_timestamp().to_string())
}

//! Token-gated original uploads.
//!
//! An upload consumes the token issued for its image name. The token is
//! burned up front so two concurrent uploads for the same name cannot
//! both proceed; if the upload then fails before the original lands on
//! disk, the token record is released so the name can be requested again.

use crate::bounds;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::params::{self, QueryParams};
use crate::state::AppState;
use axum::Json;
use axum::extract::{FromRequest, Multipart, Request};
use bytes::Bytes;
use darkroom_imaging::{Dimensions, ImagingError, UploadLimits};
use darkroom_metadata::MetadataStore;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Header carrying the upload token.
const TOKEN_HEADER: &str = "x-token";

/// Multipart field holding the image payload.
const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub id: String,
    pub original_width: u32,
    pub original_height: u32,
}

/// Releases the consumed token if the upload never completes.
///
/// Dropped on every exit path; the release itself runs on a detached task
/// because Drop cannot await.
struct ReleaseGuard {
    metadata: Arc<dyn MetadataStore>,
    image_id: String,
    completed: AtomicBool,
}

impl ReleaseGuard {
    fn new(metadata: Arc<dyn MetadataStore>, image_id: &str) -> Self {
        Self {
            metadata,
            image_id: image_id.to_string(),
            completed: AtomicBool::new(false),
        }
    }

    fn complete(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        let metadata = self.metadata.clone();
        let image_id = std::mem::take(&mut self.image_id);
        tokio::spawn(async move {
            match metadata.release_token(&image_id).await {
                Ok(released) if released > 0 => {
                    info!(image_id = %image_id, "released token after failed upload");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(image_id = %image_id, error = %err, "failed to release upload token");
                }
            }
        });
    }
}

/// POST /{name} - store an original image under a previously issued token.
pub async fn upload(
    state: AppState,
    path: &str,
    query: &QueryParams,
    req: Request,
) -> ApiResult<Json<UploadResponse>> {
    let name = params::upload_name(path)?;

    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| ApiError::Forbidden("missing or malformed upload token".to_string()))?;

    if !state.metadata.consume_token(token, &name).await? {
        metrics::UPLOADS_REJECTED.with_label_values(&["token"]).inc();
        return Err(ApiError::Forbidden(format!(
            "no valid token for image: {name}"
        )));
    }

    // From here on the token is burned; the guard gives it back unless the
    // upload runs to completion.
    let guard = ReleaseGuard::new(state.metadata.clone(), &name);

    let payload = read_image_field(&state, req).await?;
    let crop = params::upload_crop(query);
    let limits = UploadLimits {
        max_area: state.config.constraints.max_input_area(),
        max_axis: state.config.constraints.max_on_disk_axis(),
    };

    let normalized = state
        .imaging
        .normalize_upload(payload, crop, limits)
        .await
        .map_err(|err| {
            let reason = match &err {
                ImagingError::TooLarge { .. } => "too_large",
                ImagingError::UnrecognizedFormat => "format",
                _ => "processing",
            };
            metrics::UPLOADS_REJECTED.with_label_values(&[reason]).inc();
            ApiError::from(err)
        })?;

    let scratch = state.originals.scratch_path();
    tokio::fs::write(&scratch, &normalized.bytes)
        .await
        .map_err(|err| ApiError::Internal(format!("failed to stage upload: {err}")))?;
    state.originals.persist(&scratch, &name).await?;

    let dims = Dimensions {
        width: normalized.width,
        height: normalized.height,
    };
    bounds::seed_size_cache(&state, &name, dims).await;

    if !state.metadata.mark_completed(token, &name).await? {
        // The token vanished under us (raced release or manual cleanup).
        // The original is on disk but the admission record is gone.
        warn!(image_id = %name, "upload stored but token could not be finalized");
        return Err(ApiError::Forbidden(format!(
            "upload could not be finalized for image: {name}"
        )));
    }
    guard.complete();

    metrics::UPLOADS_COMPLETED.inc();
    info!(
        image_id = %name,
        width = normalized.width,
        height = normalized.height,
        bytes = normalized.bytes.len(),
        "original stored"
    );

    Ok(Json(UploadResponse {
        status: "OK",
        id: name,
        original_width: normalized.width,
        original_height: normalized.height,
    }))
}

/// Pull the image payload out of the multipart body.
async fn read_image_field(state: &AppState, req: Request) -> ApiResult<Bytes> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|err| ApiError::InvalidRequest(format!("invalid multipart body: {err}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::InvalidRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|err| ApiError::InvalidRequest(format!("unreadable image field: {err}")));
        }
    }
    Err(ApiError::InvalidRequest(format!(
        "multipart body is missing the '{IMAGE_FIELD}' field"
    )))
}

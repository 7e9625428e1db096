//! Upload token issuance.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use darkroom_metadata::MetadataError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One-in-N chance of sweeping expired tokens after a successful create.
const CLEANUP_PROBABILITY: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Image name the token authorizes an upload for.
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: Uuid,
}

/// POST /token - issue an upload token for a not-yet-claimed image name.
pub async fn create_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    // Reject names the originals store could never hold.
    state.originals.path(&body.id)?;

    let token = Uuid::new_v4();
    match state.metadata.create_token(token, &body.id).await {
        Ok(()) => {
            metrics::TOKENS_CREATED.inc();
            info!(image_id = %body.id, "upload token issued");
            maybe_cleanup(&state);
            Ok(Json(TokenResponse { token }))
        }
        Err(err) if matches!(err, MetadataError::AlreadyExists(_)) => {
            metrics::TOKENS_DENIED.inc();
            debug!(image_id = %body.id, "token denied, image already requested");
            Err(ApiError::Forbidden(format!(
                "image was already requested: {}",
                body.id
            )))
        }
        Err(err) => Err(err.into()),
    }
}

/// Probabilistic sweep of expired unused tokens. There is no scheduler;
/// creation traffic drives the cleanup.
fn maybe_cleanup(state: &AppState) {
    if rand::rng().random_range(0..CLEANUP_PROBABILITY) != 0 {
        return;
    }
    let metadata = state.metadata.clone();
    tokio::spawn(async move {
        match metadata.cleanup_expired().await {
            Ok(0) => {}
            Ok(swept) => debug!(swept, "expired upload tokens swept"),
            Err(err) => warn!(error = %err, "token cleanup sweep failed"),
        }
    });
}

use std::path::{Path, PathBuf};

use axum::Json;
use axum::extract::{Multipart, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PredictRequest {
    pub image_path: String,
    pub score_threshold: f32,
}

/// Stores an uploaded image under the uploads directory, keyed by its
/// original filename. Re-uploading the same name overwrites.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        // Strip any directory components a client smuggles into the
        // filename; only the final component lands in uploads_dir.
        let file_name = field
            .file_name()
            .and_then(|raw| Path::new(raw).file_name())
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::BadUpload("file field carries no usable filename".into()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadUpload(format!("failed to read file field: {e}")))?;

        let path = state.uploads_dir.join(&file_name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

        tracing::info!(path = %path.display(), bytes = data.len(), "image uploaded");

        return Ok(Json(json!({ "image_path": path.to_string_lossy() })));
    }

    Err(ApiError::BadUpload("multipart body has no file field".into()))
}

/// Runs both detection paths over a stored image.
///
/// The local pass runs on the blocking pool; the remote call is then
/// awaited on the request path. Both results come back side by side,
/// the caller decides which one to trust.
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Value>, ApiError> {
    let threshold = request.score_threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::InvalidThreshold(threshold));
    }

    let path = PathBuf::from(&request.image_path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| ApiError::UnreadableImage {
            path: path.clone(),
            source,
        })?;
    let image = inference::load_image(&bytes).map_err(|source| ApiError::InvalidImage {
        path: path.clone(),
        source,
    })?;

    let service = state.inference.clone();
    let post = state.post.clone();
    let local = tokio::task::spawn_blocking(move || {
        let detections = service.process_image(&image)?;
        post.process(&image, &detections, threshold)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("detection task failed: {e}")))?
    .map_err(ApiError::Detection)?;

    let predictions = state.remote.detect(&bytes).await.map_err(ApiError::Remote)?;

    tracing::info!(
        path = %path.display(),
        local_detections = local.labels.len(),
        "prediction complete"
    );

    Ok(Json(json!({
        "local": local,
        "remote": { "predictions": predictions },
    })))
}

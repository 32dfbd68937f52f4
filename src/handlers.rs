use crate::{
    cleanup,
    downloader::{self, DownloaderSettings},
    error::AppError,
    models::{DownloadRequest, ProgressResponse, SessionStatus},
    AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::time::Duration;

// ===================================================================
//                          DOWNLOAD HANDLERS
// ===================================================================

/// # POST /start - Registers a session and spawns the download task.
pub async fn start_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let settings = {
        let config = state.config.read().unwrap();
        DownloaderSettings::from_config(&config)
    };
    tokio::fs::create_dir_all(&settings.temp_dir).await?;

    let response = downloader::start(&state.sessions, settings, payload).await?;
    tracing::info!(
        "Started session {} ({})",
        response.session_id,
        response.filename
    );
    Ok((StatusCode::OK, Json(response)))
}

/// # GET /progress/:id - Reports the polled session state.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    Ok(Json(ProgressResponse {
        status: session.status,
        progress: session.progress,
        filename: session.filename,
        error: session.error,
    }))
}

// ===================================================================
//                          FILE HANDLER
// ===================================================================

/// # GET /file/:id - Streams the finished file, once.
///
/// Serving the file schedules its removal after the delivery grace period,
/// so a retry past that window gets a 404.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.status != SessionStatus::Completed {
        return Err(AppError::NotReady(session.status.as_str().to_string()));
    }

    // Registry says completed but the file can still lose a race against
    // eviction or external deletion.
    let file = tokio::fs::File::open(&session.file_path)
        .await
        .map_err(|_| AppError::NotFound("File no longer available".to_string()))?;
    let len = file.metadata().await?.len();
    let stream = tokio_util::io::ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(session.format.content_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    let disposition = format!("attachment; filename=\"{}\"", session.filename);
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)?,
    );

    let grace = Duration::from_secs(state.config.read().unwrap().delivery_grace_secs);
    cleanup::schedule_removal(state.sessions.clone(), id, grace);

    Ok((headers, body))
}

// ===================================================================
//                          HEALTH HANDLER
// ===================================================================

/// # GET /health - Liveness check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

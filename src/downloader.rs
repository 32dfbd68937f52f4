use crate::{
    config::Config,
    error::AppError,
    models::{DownloadRequest, DownloadSession, MediaFormat, Quality, SessionStatus, StartResponse},
    progress::{is_postprocessing_line, parse_progress_line, PhaseProgress},
    registry::SessionRegistry,
};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::{wrappers::LinesStream, StreamExt};
use uuid::Uuid;

/// Progress value pinned while a post-processing step runs; those steps
/// report no percentage of their own.
const POSTPROCESSING_PROGRESS: f64 = 95.0;

/// Only a short prefix of the extractor's stderr is kept on the session.
const MAX_ERROR_LEN: usize = 500;

const FALLBACK_TITLE: &str = "download";

/// The slice of configuration the orchestrator needs, cloned out of the
/// shared config so background tasks never hold its lock.
#[derive(Clone, Debug)]
pub struct DownloaderSettings {
    pub yt_dlp_path: String,
    pub cookies_file: Option<String>,
    pub temp_dir: PathBuf,
}

impl DownloaderSettings {
    pub fn from_config(config: &Config) -> Self {
        DownloaderSettings {
            yt_dlp_path: config.yt_dlp_path.clone(),
            cookies_file: config.cookies_file.clone(),
            temp_dir: PathBuf::from(&config.temp_directory),
        }
    }
}

/// Validates the request, registers a pending session and spawns the
/// download task. Returns to the caller before the download begins; from
/// here on the session registry is the only channel back to the client.
pub async fn start(
    registry: &SessionRegistry,
    settings: DownloaderSettings,
    payload: DownloadRequest,
) -> Result<StartResponse, AppError> {
    let url = payload
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("URL is required".to_string()))?
        .to_string();
    let format = payload
        .format
        .as_deref()
        .and_then(MediaFormat::parse)
        .ok_or_else(|| AppError::BadRequest("Format must be one of: video, audio".to_string()))?;
    let quality = payload
        .quality
        .as_deref()
        .and_then(Quality::parse)
        .ok_or_else(|| AppError::BadRequest("Quality must be one of: high, mid, low".to_string()))?;

    let id = Uuid::new_v4().to_string();
    let file_path = settings
        .temp_dir
        .join(format!("{}.{}", id, format.extension()));

    let title = match payload.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => resolve_title(&settings, &url).await,
    };
    let filename = format!("{}.{}", sanitize_title(&title), format.extension());

    registry.create(DownloadSession::new(
        id.clone(),
        format,
        filename.clone(),
        file_path,
    ));

    tokio::spawn(run_download_task(
        registry.clone(),
        settings,
        id.clone(),
        url,
        format,
        quality,
    ));

    Ok(StartResponse {
        session_id: id,
        filename,
    })
}

/// Best-effort title lookup via the extractor. Any failure falls back to a
/// generic placeholder; the caller never sees an error from this step.
async fn resolve_title(settings: &DownloaderSettings, url: &str) -> String {
    let mut cmd = Command::new(&settings.yt_dlp_path);
    cmd.arg("--print").arg("title").arg("--no-warnings").arg("--skip-download");
    if let Some(cookies) = &settings.cookies_file {
        cmd.arg("--cookies").arg(cookies);
    }
    cmd.arg(url);

    match cmd.output().await {
        Ok(output) if output.status.success() => {
            let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if title.is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                title
            }
        }
        _ => FALLBACK_TITLE.to_string(),
    }
}

/// Replaces filesystem-hostile characters before the title becomes part of
/// a Content-Disposition filename.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '_',
            other => other,
        })
        .collect()
}

/// Builds the extractor argument vector for the requested format/quality.
/// A deterministic lookup, not a runtime decision.
fn build_args(settings: &DownloaderSettings, id: &str, format: MediaFormat, quality: Quality) -> Vec<String> {
    let template = settings
        .temp_dir
        .join(format!("{id}.%(ext)s"))
        .to_string_lossy()
        .to_string();

    let mut args = vec![
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "-o".to_string(),
        template,
    ];
    if let Some(cookies) = &settings.cookies_file {
        args.push("--cookies".to_string());
        args.push(cookies.clone());
    }

    match format {
        MediaFormat::Audio => {
            // VBR scale: 0 is best, 9 is smallest.
            let audio_quality = match quality {
                Quality::High => "0",
                Quality::Mid => "5",
                Quality::Low => "9",
            };
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                audio_quality.to_string(),
            ]);
        }
        MediaFormat::Video => {
            let max_height = match quality {
                Quality::High => 1080,
                Quality::Mid => 720,
                Quality::Low => 480,
            };
            let selector = format!(
                "bestvideo[height<={max_height}][vcodec^=avc1]+bestaudio[acodec^=mp4a]/\
                 bestvideo[height<={max_height}]+bestaudio/best[height<={max_height}]/best"
            );
            // Force h264/aac in an mp4 container regardless of source codec
            // so the mobile client can always play the result.
            args.extend([
                "-f".to_string(),
                selector,
                "--merge-output-format".to_string(),
                "mp4".to_string(),
                "--recode-video".to_string(),
                "mp4".to_string(),
                "--postprocessor-args".to_string(),
                "ffmpeg:-c:v libx264 -c:a aac".to_string(),
            ]);
        }
    }
    args
}

/// The long-running task owning one session's downloads and mutations.
/// Spawned by `start` and detached from the request/response cycle; every
/// failure path ends in a terminal error status, nothing propagates out.
pub async fn run_download_task(
    registry: SessionRegistry,
    settings: DownloaderSettings,
    id: String,
    url: String,
    format: MediaFormat,
    quality: Quality,
) {
    let file_path = match registry.get(&id) {
        Some(session) => session.file_path,
        // Evicted before we even started; nothing to report to.
        None => return,
    };

    registry.mutate(&id, |s| s.status = SessionStatus::Downloading);

    let mut cmd = Command::new(&settings.yt_dlp_path);
    cmd.args(build_args(&settings, &id, format, quality))
        .arg(&url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            fail_session(&registry, &id, format!("Failed to start extractor process: {e}"));
            return;
        }
    };

    let mut mapper = PhaseProgress::new(format == MediaFormat::Audio);
    let mut postprocessing = false;

    if let Some(stdout) = child.stdout.take() {
        let reader = BufReader::new(stdout).lines();
        let mut lines = LinesStream::new(reader);
        while let Some(Ok(line)) = lines.next().await {
            if is_postprocessing_line(&line) {
                postprocessing = true;
                registry.mutate(&id, |s| {
                    s.status = SessionStatus::Processing;
                    s.progress = POSTPROCESSING_PROGRESS;
                });
            } else if !postprocessing {
                if let Some(raw) = parse_progress_line(&line) {
                    let overall = mapper.observe(raw);
                    registry.mutate(&id, |s| s.progress = overall);
                }
            }
        }
    }

    let output = match child.wait_with_output().await {
        Ok(output) => output,
        Err(e) => {
            fail_session(&registry, &id, format!("Extractor process failed to run: {e}"));
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!("Extraction failed for session {}: {}", id, stderr.trim());
        let snippet: String = stderr.trim().chars().take(MAX_ERROR_LEN).collect();
        let message = if snippet.is_empty() {
            "Extractor exited with an error".to_string()
        } else {
            snippet
        };
        fail_session(&registry, &id, message);
        return;
    }

    // A success exit is only committed once the file is actually there.
    match tokio::fs::metadata(&file_path).await {
        Ok(meta) if meta.len() > 0 => {
            registry.mutate(&id, |s| {
                s.status = SessionStatus::Completed;
                s.progress = 100.0;
            });
            tracing::info!("Session {} completed ({} bytes)", id, meta.len());
        }
        _ => {
            fail_session(&registry, &id, "File not found after download".to_string());
        }
    }
}

fn fail_session(registry: &SessionRegistry, id: &str, message: String) {
    registry.mutate(id, |s| {
        s.status = SessionStatus::Error;
        s.error = Some(message);
    });
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

// === API Request/Response Models ===

/// The JSON body for a `POST /start` request.
///
/// Every field is optional at the serde layer so that missing or invalid
/// input surfaces as our own 400 JSON body instead of a framework rejection.
#[derive(Deserialize, Debug, Default)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub title: Option<String>,
}

/// The response sent after successfully starting a download.
#[derive(Serialize, Debug)]
pub struct StartResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub filename: String,
}

/// The body of a `GET /progress/:id` response.
#[derive(Serialize, Debug)]
pub struct ProgressResponse {
    pub status: SessionStatus,
    pub progress: f64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === Session Models ===

/// The requested output container, which also fixes the extension and the
/// content type of the delivered file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MediaFormat {
    Video,
    Audio,
}

impl MediaFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(MediaFormat::Video),
            "audio" => Some(MediaFormat::Audio),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Video => "mp4",
            MediaFormat::Audio => "mp3",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaFormat::Video => "video/mp4",
            MediaFormat::Audio => "audio/mpeg",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Quality {
    High,
    Mid,
    Low,
}

impl Quality {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Quality::High),
            "mid" => Some(Quality::Mid),
            "low" => Some(Quality::Low),
            _ => None,
        }
    }
}

/// Lifecycle state of one download session. Transitions are monotonic:
/// pending -> downloading -> [processing] -> completed | error.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Downloading => "downloading",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

/// One tracked download job, from request to file delivery or eviction.
/// Owned exclusively by the session registry.
#[derive(Clone, Debug)]
pub struct DownloadSession {
    pub id: String,
    pub status: SessionStatus,
    pub progress: f64,
    pub format: MediaFormat,
    /// Human-readable name sent in `Content-Disposition`, not the disk path.
    pub filename: String,
    /// Fixed on-disk path, deterministic from `id` and the extension.
    pub file_path: PathBuf,
    pub error: Option<String>,
    pub created_at: Instant,
}

impl DownloadSession {
    pub fn new(id: String, format: MediaFormat, filename: String, file_path: PathBuf) -> Self {
        DownloadSession {
            id,
            status: SessionStatus::Pending,
            progress: 0.0,
            format,
            filename,
            file_path,
            error: None,
            created_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_rejects_unknown() {
        assert_eq!(MediaFormat::parse("video"), Some(MediaFormat::Video));
        assert_eq!(MediaFormat::parse("audio"), Some(MediaFormat::Audio));
        assert_eq!(MediaFormat::parse("mp4"), None);
        assert_eq!(MediaFormat::parse(""), None);
    }

    #[test]
    fn quality_parse_rejects_unknown() {
        assert_eq!(Quality::parse("high"), Some(Quality::High));
        assert_eq!(Quality::parse("mid"), Some(Quality::Mid));
        assert_eq!(Quality::parse("low"), Some(Quality::Low));
        assert_eq!(Quality::parse("best"), None);
    }

    #[test]
    fn extension_and_content_type_follow_format() {
        assert_eq!(MediaFormat::Audio.extension(), "mp3");
        assert_eq!(MediaFormat::Audio.content_type(), "audio/mpeg");
        assert_eq!(MediaFormat::Video.extension(), "mp4");
        assert_eq!(MediaFormat::Video.content_type(), "video/mp4");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Error).unwrap(),
            "\"error\""
        );
    }
}

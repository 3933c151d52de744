use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{MediaKind, ProgressSnapshot, VideoQuality};
use crate::utils::parse_percent;

/// Response from the info endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VideoMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail: String,
    /// Length in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uploader: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub view_count: Option<u64>,
    /// `YYYYMMDD` as reported by the extractor
    #[serde(default, deserialize_with = "null_as_default")]
    pub upload_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub formats: Vec<FormatInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FormatInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resolution: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ext: String,
    #[serde(default)]
    pub format_id: Option<String>,
    /// The backend sends a number, `"unknown"` or null.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InfoRequest<'a> {
    pub url: &'a str,
}

/// Body of the download endpoint.
///
/// Audio requests never carry `quality` and video requests never carry
/// `audio_format`: the backend treats an absent key differently from null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartDownloadRequest<'a> {
    pub url: &'a str,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<&'a str>,
}

impl<'a> StartDownloadRequest<'a> {
    pub fn new(
        url: &'a str,
        kind: MediaKind,
        quality: Option<VideoQuality>,
        audio_format: &'a str,
    ) -> Self {
        match kind {
            MediaKind::Audio => Self {
                url,
                kind,
                quality: None,
                audio_format: Some(audio_format),
            },
            MediaKind::Video => Self {
                url,
                kind,
                quality: Some(quality.unwrap_or_default().as_str()),
                audio_format: None,
            },
        }
    }
}

/// Response from the download endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StartedDownload {
    pub download_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// What the backend says a download is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedPhase {
    Starting,
    Downloading,
    Processing,
    Completed,
    Error,
    Other(String),
}

/// Response from the progress endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default)]
    pub percent: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub downloaded: Option<String>,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StatusReport {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> ReportedPhase {
        match self.status.as_str() {
            "starting" => ReportedPhase::Starting,
            "downloading" => ReportedPhase::Downloading,
            "processing" => ReportedPhase::Processing,
            "completed" => ReportedPhase::Completed,
            "error" => ReportedPhase::Error,
            other => ReportedPhase::Other(other.to_string()),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent.as_deref().and_then(parse_percent),
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            downloaded: self.downloaded.clone(),
            total: self.total.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub download_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Response from the downloads endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct History {
    #[serde(default, deserialize_with = "null_as_default")]
    pub downloads: Vec<HistoryEntry>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServerStats {
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_size_mb: f64,
    #[serde(default)]
    pub active_downloads: u64,
    #[serde(default)]
    pub completed_downloads: u64,
    #[serde(default)]
    pub max_files_kept: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CleanupRequest {
    pub keep: u32,
}

/// Response from the cleanup endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CleanupReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    pub deleted: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deleted_files: Vec<String>,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub download_folder: Option<String>,
    #[serde(default)]
    pub max_files: Option<u64>,
}

/// Error body the backend attaches to non-success responses
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Endpoint paths relative to the base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPaths {
    pub info: String,
    pub download: String,
    /// The download id is appended as a final segment.
    pub progress: String,
    /// The download id is appended as a final segment.
    pub file: String,
    pub downloads: String,
    pub cleanup: String,
    pub stats: String,
    pub health: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            info: "/api/info".to_string(),
            download: "/api/download".to_string(),
            progress: "/api/progress".to_string(),
            file: "/api/file".to_string(),
            downloads: "/api/downloads".to_string(),
            cleanup: "/api/cleanup".to_string(),
            stats: "/api/stats".to_string(),
            health: "/health".to_string(),
        }
    }
}

/// Configuration for the API client
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub paths: ApiPaths,
    /// Container requested for audio downloads
    pub audio_format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            paths: ApiPaths::default(),
            audio_format: "mp3".to_string(),
        }
    }
}

/// Treats an explicit null like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audio_request_omits_quality() {
        let body = StartDownloadRequest::new("https://a.b/c", MediaKind::Audio, None, "mp3");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({"url": "https://a.b/c", "type": "audio", "audio_format": "mp3"})
        );
        assert!(value.get("quality").is_none());
    }

    #[test]
    fn test_video_request_omits_audio_format() {
        let body = StartDownloadRequest::new(
            "https://a.b/c",
            MediaKind::Video,
            Some(VideoQuality::P720),
            "mp3",
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({"url": "https://a.b/c", "type": "video", "quality": "720"})
        );
    }

    #[test]
    fn test_video_request_defaults_to_best() {
        let body = StartDownloadRequest::new("https://a.b/c", MediaKind::Video, None, "m4a");
        assert_eq!(body.quality, Some("best"));
        assert_eq!(body.audio_format, None);
    }

    #[test]
    fn test_metadata_tolerates_unknown_filesize() {
        let meta: VideoMetadata = serde_json::from_value(json!({
            "title": "Clip",
            "duration": 12.5,
            "view_count": null,
            "formats": [
                {"resolution": "1280x720", "ext": "mp4", "format_id": "22", "filesize": "unknown"},
                {"resolution": "640x360", "ext": "mp4", "format_id": "18", "filesize": 1024}
            ]
        }))
        .unwrap();
        assert_eq!(meta.title, "Clip");
        assert_eq!(meta.view_count, None);
        assert_eq!(meta.formats[0].filesize, None);
        assert_eq!(meta.formats[1].filesize, Some(1024));
    }

    #[test]
    fn test_metadata_accepts_null_text_fields() {
        let meta: VideoMetadata = serde_json::from_value(json!({
            "title": "Clip",
            "thumbnail": null,
            "duration": null,
            "uploader": null,
            "view_count": 10,
            "upload_date": null,
            "description": null,
            "formats": [{"resolution": null, "ext": "webm", "filesize": null}]
        }))
        .unwrap();
        assert_eq!(meta.title, "Clip");
        assert_eq!(meta.thumbnail, "");
        assert_eq!(meta.uploader, "");
        assert_eq!(meta.upload_date, "");
        assert_eq!(meta.description, "");
        assert_eq!(meta.view_count, Some(10));
        assert_eq!(meta.formats[0].resolution, "");
        assert_eq!(meta.formats[0].ext, "webm");

        let entry: HistoryEntry = serde_json::from_value(json!({
            "download_id": "d-1",
            "title": null,
            "type": null
        }))
        .unwrap();
        assert_eq!(entry.title, "");
        assert_eq!(entry.kind, "");
    }

    #[test]
    fn test_status_phase_and_snapshot() {
        let report: StatusReport = serde_json::from_value(json!({
            "status": "downloading",
            "percent": " 42.5%",
            "speed": "1.2MiB/s",
            "eta": "00:10"
        }))
        .unwrap();
        assert_eq!(report.phase(), ReportedPhase::Downloading);
        let snapshot = report.snapshot();
        assert_eq!(snapshot.percent, Some(42.5));
        assert_eq!(snapshot.eta.as_deref(), Some("00:10"));

        assert_eq!(
            StatusReport::with_status("queued").phase(),
            ReportedPhase::Other("queued".to_string())
        );
    }
}

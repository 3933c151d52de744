use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::VideoMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    FetchingInfo,
    InfoReady,
    Starting,
    InProgress,
    Processing,
    Succeeded,
    Failed,
}

impl LifecycleState {
    /// A session in one of these states owns in-flight work.
    pub fn is_active(self) -> bool {
        !matches!(
            self,
            LifecycleState::Idle | LifecycleState::Succeeded | LifecycleState::Failed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Succeeded | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::FetchingInfo => "fetching info",
            LifecycleState::InfoReady => "info ready",
            LifecycleState::Starting => "starting",
            LifecycleState::InProgress => "downloading",
            LifecycleState::Processing => "processing",
            LifecycleState::Succeeded => "completed",
            LifecycleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("Video"),
            MediaKind::Audio => f.write_str("Audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoQuality {
    #[default]
    Best,
    P1080,
    P720,
    P480,
    P360,
}

impl VideoQuality {
    pub const ALL: [VideoQuality; 5] = [
        VideoQuality::Best,
        VideoQuality::P1080,
        VideoQuality::P720,
        VideoQuality::P480,
        VideoQuality::P360,
    ];

    /// Value the backend expects in the `quality` field.
    pub fn as_str(self) -> &'static str {
        match self {
            VideoQuality::Best => "best",
            VideoQuality::P1080 => "1080",
            VideoQuality::P720 => "720",
            VideoQuality::P480 => "480",
            VideoQuality::P360 => "360",
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoQuality::Best => f.write_str("Best available"),
            other => write!(f, "{}p", other.as_str()),
        }
    }
}

/// Progress as last reported by the backend while a download runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Parsed percentage in `0.0..=100.0`, when the backend sent one.
    pub percent: Option<f32>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub downloaded: Option<String>,
    pub total: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub download_id: String,
    pub filename: Option<String>,
    pub filesize: Option<u64>,
}

/// One user attempt to obtain a file, from metadata fetch to terminal outcome.
///
/// Only `DownloadController` mutates a session; everything else sees it
/// through a shared reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadSession {
    pub source_url: Option<String>,
    pub metadata: Option<VideoMetadata>,
    pub media_kind: MediaKind,
    pub requested_quality: Option<VideoQuality>,
    pub download_id: Option<String>,
    pub lifecycle_state: LifecycleState,
    pub last_error: Option<String>,
    pub last_progress_snapshot: Option<ProgressSnapshot>,
    pub completed: Option<CompletedDownload>,
}

impl DownloadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session that keeps the already fetched source and metadata.
    pub fn with_metadata(source_url: String, metadata: VideoMetadata) -> Self {
        Self {
            source_url: Some(source_url),
            metadata: Some(metadata),
            lifecycle_state: LifecycleState::InfoReady,
            ..Self::default()
        }
    }
}

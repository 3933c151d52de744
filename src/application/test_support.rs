//! In-memory backend and recording projector shared by the application tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::projector::{Notice, NoticeLevel, SessionView, UiProjector};
use crate::api::{
    ApiError, CleanupReport, DownloadBackend, HealthReport, History, HistoryEntry, Result,
    ServerStats, StartedDownload, StatusReport, VideoMetadata,
};
use crate::domain::{LifecycleState, MediaKind, VideoQuality};

#[derive(Debug, Clone, PartialEq)]
pub struct StartCall {
    pub url: String,
    pub kind: MediaKind,
    pub quality: Option<VideoQuality>,
}

struct Script {
    metadata: Result<VideoMetadata>,
    metadata_by_url: HashMap<String, Result<VideoMetadata>>,
    metadata_delays: VecDeque<Duration>,
    metadata_calls: usize,
    start_error: Option<ApiError>,
    start_delays: VecDeque<Duration>,
    start_calls: Vec<StartCall>,
    statuses: VecDeque<Result<StatusReport>>,
    default_status: Option<StatusReport>,
    status_delay: Duration,
    polled_ids: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
    health: Result<HealthReport>,
    history_calls: usize,
    stats_calls: usize,
    cleanup_calls: Vec<u32>,
}

/// Backend double whose answers are queued up front by the test.
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                metadata: Ok(VideoMetadata {
                    title: "Test Clip".to_string(),
                    ..VideoMetadata::default()
                }),
                metadata_by_url: HashMap::new(),
                metadata_delays: VecDeque::new(),
                metadata_calls: 0,
                start_error: None,
                start_delays: VecDeque::new(),
                start_calls: Vec::new(),
                statuses: VecDeque::new(),
                default_status: None,
                status_delay: Duration::ZERO,
                polled_ids: Vec::new(),
                in_flight: 0,
                max_in_flight: 0,
                health: Ok(HealthReport {
                    status: "healthy".to_string(),
                    ..HealthReport::default()
                }),
                history_calls: 0,
                stats_calls: 0,
                cleanup_calls: Vec::new(),
            }),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_metadata(&self, metadata: Result<VideoMetadata>) {
        self.script().metadata = metadata;
    }

    /// Answer for one URL, overriding the shared metadata.
    pub fn set_metadata_for(&self, url: &str, metadata: Result<VideoMetadata>) {
        self.script()
            .metadata_by_url
            .insert(url.to_string(), metadata);
    }

    /// Delay for the next `fetch_metadata` call, in call order.
    pub fn push_metadata_delay(&self, delay: Duration) {
        self.script().metadata_delays.push_back(delay);
    }

    pub fn fail_start(&self, message: &str) {
        self.script().start_error = Some(ApiError::new(message));
    }

    /// Delay for the next `start_download` call, in call order.
    pub fn push_start_delay(&self, delay: Duration) {
        self.script().start_delays.push_back(delay);
    }

    pub fn push_status(&self, status: Result<StatusReport>) {
        self.script().statuses.push_back(status);
    }

    /// Answer used once the queued statuses run out.
    pub fn set_default_status(&self, status: StatusReport) {
        self.script().default_status = Some(status);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.script().status_delay = delay;
    }

    pub fn set_health(&self, health: Result<HealthReport>) {
        self.script().health = health;
    }

    pub fn metadata_calls(&self) -> usize {
        self.script().metadata_calls
    }

    pub fn start_calls(&self) -> Vec<StartCall> {
        self.script().start_calls.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.script().polled_ids.len()
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.script().polled_ids.clone()
    }

    pub fn max_concurrent_status_calls(&self) -> usize {
        self.script().max_in_flight
    }

    pub fn history_calls(&self) -> usize {
        self.script().history_calls
    }

    pub fn stats_calls(&self) -> usize {
        self.script().stats_calls
    }

    pub fn cleanup_calls(&self) -> Vec<u32> {
        self.script().cleanup_calls.clone()
    }
}

/// Decrements the in-flight count even when the request future is dropped.
struct InFlight<'a>(&'a ScriptedBackend);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.script().in_flight -= 1;
    }
}

#[async_trait]
impl DownloadBackend for ScriptedBackend {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        let (delay, outcome) = {
            let mut script = self.script();
            script.metadata_calls += 1;
            let delay = script.metadata_delays.pop_front().unwrap_or_default();
            let outcome = script
                .metadata_by_url
                .get(url)
                .unwrap_or(&script.metadata)
                .clone();
            (delay, outcome)
        };
        tokio::time::sleep(delay).await;
        outcome
    }

    async fn start_download(
        &self,
        url: &str,
        kind: MediaKind,
        quality: Option<VideoQuality>,
    ) -> Result<StartedDownload> {
        let (delay, outcome) = {
            let mut script = self.script();
            script.start_calls.push(StartCall {
                url: url.to_string(),
                kind,
                quality,
            });
            let id = format!("dl-{}", script.start_calls.len());
            let delay = script.start_delays.pop_front().unwrap_or_default();
            let outcome = match &script.start_error {
                Some(err) => Err(err.clone()),
                None => Ok(StartedDownload {
                    download_id: id,
                    message: Some("Download started".to_string()),
                    timestamp: None,
                }),
            };
            (delay, outcome)
        };
        tokio::time::sleep(delay).await;
        outcome
    }

    async fn get_status(&self, download_id: &str) -> Result<StatusReport> {
        let (delay, outcome) = {
            let mut script = self.script();
            script.polled_ids.push(download_id.to_string());
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);
            let outcome = match script.statuses.pop_front() {
                Some(next) => next,
                None => script
                    .default_status
                    .clone()
                    .ok_or_else(|| ApiError::new("no scripted status")),
            };
            (script.status_delay, outcome)
        };
        let _guard = InFlight(self);
        tokio::time::sleep(delay).await;
        outcome
    }

    async fn list_history(&self) -> Result<History> {
        self.script().history_calls += 1;
        Ok(History {
            downloads: vec![HistoryEntry {
                download_id: "dl-0".to_string(),
                filename: Some("dl-0_old.mp3".to_string()),
                filesize: Some(1024),
                title: "old".to_string(),
                kind: "audio".to_string(),
                completed_at: None,
            }],
            count: 1,
        })
    }

    async fn get_stats(&self) -> Result<ServerStats> {
        self.script().stats_calls += 1;
        Ok(ServerStats {
            total_files: 1,
            ..ServerStats::default()
        })
    }

    async fn cleanup(&self, keep: u32) -> Result<CleanupReport> {
        self.script().cleanup_calls.push(keep);
        Ok(CleanupReport {
            message: "Cleanup completed".to_string(),
            deleted: 2,
            deleted_files: vec!["a.mp4".to_string(), "b.mp3".to_string()],
            remaining: u64::from(keep),
            timestamp: None,
        })
    }

    async fn health_check(&self) -> Result<HealthReport> {
        self.script().health.clone()
    }
}

/// Projector that keeps everything it is shown.
#[derive(Default)]
pub struct RecordingProjector {
    pub views: Vec<SessionView>,
    pub notices: Vec<Notice>,
    pub history: Vec<Vec<HistoryEntry>>,
    pub stats: Vec<ServerStats>,
}

impl RecordingProjector {
    pub fn states(&self) -> Vec<LifecycleState> {
        self.views.iter().map(|view| view.state).collect()
    }

    pub fn notices_at(&self, level: NoticeLevel) -> Vec<&Notice> {
        self.notices.iter().filter(|n| n.level == level).collect()
    }
}

impl UiProjector for RecordingProjector {
    fn render(&mut self, view: &SessionView) {
        self.views.push(view.clone());
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn render_history(&mut self, entries: &[HistoryEntry]) {
        self.history.push(entries.to_vec());
    }

    fn render_stats(&mut self, stats: &ServerStats) {
        self.stats.push(stats.clone());
    }
}

use async_trait::async_trait;

use super::client::Result;
use super::models::{
    CleanupReport, HealthReport, History, ServerStats, StartedDownload, StatusReport,
    VideoMetadata,
};
use crate::domain::{MediaKind, VideoQuality};

/// The remote download service as seen by the tracker and the controller.
///
/// Each call is a single round trip with no retries; retry policy belongs
/// to the caller.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata>;

    /// `quality` is ignored for audio downloads.
    async fn start_download(
        &self,
        url: &str,
        kind: MediaKind,
        quality: Option<VideoQuality>,
    ) -> Result<StartedDownload>;

    /// Safe to call repeatedly for the same id.
    async fn get_status(&self, download_id: &str) -> Result<StatusReport>;

    async fn list_history(&self) -> Result<History>;

    async fn get_stats(&self) -> Result<ServerStats>;

    async fn cleanup(&self, keep: u32) -> Result<CleanupReport>;

    async fn health_check(&self) -> Result<HealthReport>;
}

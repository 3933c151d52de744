pub mod backend;
pub mod client;
pub mod models;

pub use backend::DownloadBackend;
pub use client::{ApiClient, ApiError, Result};
pub use models::{
    ApiConfig, ApiPaths, CleanupReport, FormatInfo, HealthReport, History, HistoryEntry,
    ReportedPhase, ServerStats, StartedDownload, StatusReport, VideoMetadata,
};

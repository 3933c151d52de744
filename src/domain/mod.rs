pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    CompletedDownload, DownloadSession, LifecycleState, MediaKind, ProgressSnapshot,
    VideoQuality,
};

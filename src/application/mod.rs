pub mod download_controller;
pub mod file_saver;
pub mod progress_tracker;
pub mod projector;

#[cfg(test)]
pub(crate) mod test_support;

pub use download_controller::{ControllerEvent, ControllerSettings, DownloadController};
pub use file_saver::{FileSaver, SaveEvent};
pub use progress_tracker::{ProgressTracker, TrackerObserver, TrackerUpdate};
pub use projector::{Notice, NoticeLevel, SessionDetail, SessionView, UiProjector};

//! What the controller hands to the UI layer.
//!
//! The projector only ever receives data. The controller never reads back
//! from it, so any front end (or a test recorder) can sit behind the trait.

use crate::api::{HistoryEntry, ServerStats, VideoMetadata};
use crate::domain::{CompletedDownload, DownloadSession, LifecycleState, ProgressSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionDetail {
    None,
    Progress(ProgressSnapshot),
    Completed(CompletedDownload),
    Error(String),
}

/// Everything the UI needs to draw the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: LifecycleState,
    pub metadata: Option<VideoMetadata>,
    pub detail: SessionDetail,
}

impl SessionView {
    pub fn of(session: &DownloadSession) -> Self {
        let detail = match session.lifecycle_state {
            LifecycleState::Failed => session
                .last_error
                .clone()
                .map(SessionDetail::Error)
                .unwrap_or(SessionDetail::None),
            LifecycleState::Succeeded => session
                .completed
                .clone()
                .map(SessionDetail::Completed)
                .unwrap_or(SessionDetail::None),
            LifecycleState::InProgress | LifecycleState::Processing => session
                .last_progress_snapshot
                .clone()
                .map(SessionDetail::Progress)
                .unwrap_or(SessionDetail::None),
            _ => SessionDetail::None,
        };

        Self {
            state: session.lifecycle_state,
            metadata: session.metadata.clone(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient message for the user, separate from session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives projections of controller state. Calls must be idempotent for
/// identical input.
pub trait UiProjector {
    fn render(&mut self, view: &SessionView);

    fn notify(&mut self, notice: Notice);

    fn render_history(&mut self, entries: &[HistoryEntry]);

    fn render_stats(&mut self, stats: &ServerStats);
}

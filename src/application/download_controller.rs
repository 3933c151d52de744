//! State machine for a single logical download session.
//!
//! The controller is the only writer of its [`DownloadSession`]. User actions
//! come in as method calls, network results come back as [`ControllerEvent`]s
//! on the channel returned by [`DownloadController::new`], and the owner feeds
//! each of those to [`DownloadController::handle_event`] one at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::progress_tracker::{
    ProgressTracker, TrackerObserver, TrackerUpdate, DEFAULT_POLL_INTERVAL,
};
use super::projector::{Notice, SessionView, UiProjector};
use crate::api::{
    CleanupReport, DownloadBackend, HealthReport, History, ReportedPhase, ServerStats,
    StartedDownload, StatusReport, VideoMetadata,
};
use crate::domain::{
    AppError, CompletedDownload, DownloadSession, LifecycleState, MediaKind, VideoQuality,
};
use crate::utils::validate_url;

pub const DEFAULT_MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub max_url_length: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
        }
    }
}

/// Results of work the controller started.
///
/// Request results carry the ticket they were issued under; results whose
/// ticket is no longer current are dropped.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    MetadataLoaded {
        ticket: u64,
        url: String,
        result: Result<VideoMetadata, AppError>,
    },
    DispatchCompleted {
        ticket: u64,
        result: Result<StartedDownload, AppError>,
    },
    Tracker {
        tracker_id: u64,
        update: TrackerUpdate,
    },
    HealthChecked(Result<HealthReport, AppError>),
    HistoryLoaded(Result<History, AppError>),
    StatsLoaded(Result<ServerStats, AppError>),
    CleanupFinished(Result<CleanupReport, AppError>),
}

/// Forwards one tracker's updates onto the controller channel.
struct SessionRelay {
    tracker_id: u64,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl TrackerObserver for SessionRelay {
    fn on_update(&self, update: TrackerUpdate) {
        let _ = self.events.send(ControllerEvent::Tracker {
            tracker_id: self.tracker_id,
            update,
        });
    }
}

struct ActiveTracker {
    id: u64,
    tracker: ProgressTracker,
}

pub struct DownloadController {
    backend: Arc<dyn DownloadBackend>,
    runtime: Handle,
    settings: ControllerSettings,
    events: mpsc::UnboundedSender<ControllerEvent>,
    session: DownloadSession,
    tracker: Option<ActiveTracker>,
    next_tracker_id: u64,
    next_ticket: u64,
    pending_ticket: Option<u64>,
    health_warned: bool,
}

impl DownloadController {
    pub fn new(
        backend: Arc<dyn DownloadBackend>,
        runtime: Handle,
        settings: ControllerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            runtime,
            settings,
            events,
            session: DownloadSession::new(),
            tracker: None,
            next_tracker_id: 0,
            next_ticket: 0,
            pending_ticket: None,
            health_warned: false,
        };
        (controller, receiver)
    }

    pub fn session(&self) -> &DownloadSession {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        self.session.lifecycle_state
    }

    /// Id currently being polled, if any.
    pub fn tracked_download_id(&self) -> Option<&str> {
        self.tracker
            .as_ref()
            .filter(|active| active.tracker.is_active())
            .map(|active| active.tracker.download_id())
    }

    pub fn render(&self, ui: &mut dyn UiProjector) {
        ui.render(&SessionView::of(&self.session));
    }

    /// Look up metadata for `url`, starting a fresh session.
    ///
    /// Invalid input fails the new session without any network call.
    pub fn fetch_info(&mut self, url: &str, ui: &mut dyn UiProjector) -> Result<(), AppError> {
        let state = self.state();
        if state.is_active() && state != LifecycleState::FetchingInfo {
            return Err(AppError::InvalidAction {
                action: "fetch info",
                state,
            });
        }

        self.stop_tracker();
        self.session = DownloadSession::new();
        self.transition(LifecycleState::FetchingInfo);
        let ticket = self.issue_ticket();
        self.render(ui);

        let url = match validate_url(url, self.settings.max_url_length) {
            Ok(url) => url,
            Err(err) => {
                self.pending_ticket = None;
                self.fail(err, ui);
                self.render(ui);
                return Ok(());
            }
        };

        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = backend.fetch_metadata(&url).await.map_err(AppError::from);
            ControllerEvent::MetadataLoaded {
                ticket,
                url,
                result,
            }
        });
        Ok(())
    }

    /// Ask the backend to start downloading the fetched URL.
    ///
    /// Calling this again before the first dispatch answers supersedes it:
    /// only the latest dispatch's download id is ever tracked.
    pub fn start_download(
        &mut self,
        kind: MediaKind,
        quality: Option<VideoQuality>,
        ui: &mut dyn UiProjector,
    ) -> Result<(), AppError> {
        let state = self.state();
        let source_url = match (state, self.session.source_url.clone()) {
            (LifecycleState::InfoReady | LifecycleState::Starting, Some(url)) => url,
            _ => {
                return Err(AppError::InvalidAction {
                    action: "start a download",
                    state,
                })
            }
        };

        self.session.media_kind = kind;
        self.session.requested_quality = match kind {
            MediaKind::Video => Some(quality.unwrap_or_default()),
            MediaKind::Audio => None,
        };
        self.session.download_id = None;
        self.session.last_error = None;
        self.session.last_progress_snapshot = None;
        self.session.completed = None;
        self.transition(LifecycleState::Starting);
        let ticket = self.issue_ticket();

        let backend = Arc::clone(&self.backend);
        let quality = self.session.requested_quality;
        self.spawn(async move {
            let result = backend
                .start_download(&source_url, kind, quality)
                .await
                .map_err(AppError::from);
            ControllerEvent::DispatchCompleted { ticket, result }
        });

        self.render(ui);
        Ok(())
    }

    /// Leave a failed session, keeping fetched metadata when there is some.
    pub fn retry(&mut self, ui: &mut dyn UiProjector) -> Result<(), AppError> {
        let state = self.state();
        if state != LifecycleState::Failed {
            return Err(AppError::InvalidAction {
                action: "retry",
                state,
            });
        }

        self.stop_tracker();
        self.pending_ticket = None;
        let previous = std::mem::take(&mut self.session);
        self.session = match (previous.source_url, previous.metadata) {
            (Some(url), Some(metadata)) => DownloadSession::with_metadata(url, metadata),
            _ => DownloadSession::new(),
        };
        info!(from = %state, to = %self.state(), "retry");
        self.render(ui);
        Ok(())
    }

    /// Discard the current session, whatever it is doing.
    pub fn new_download(&mut self, ui: &mut dyn UiProjector) {
        let state = self.state();
        self.stop_tracker();
        self.pending_ticket = None;
        self.session = DownloadSession::new();
        info!(from = %state, "new download");
        self.render(ui);
    }

    /// Advisory backend check. The first failure produces one warning.
    pub fn check_health(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            ControllerEvent::HealthChecked(backend.health_check().await.map_err(AppError::from))
        });
    }

    pub fn refresh_history(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            ControllerEvent::HistoryLoaded(backend.list_history().await.map_err(AppError::from))
        });
    }

    pub fn refresh_stats(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            ControllerEvent::StatsLoaded(backend.get_stats().await.map_err(AppError::from))
        });
    }

    /// Ask the backend to keep only the `keep` most recent files.
    pub fn cleanup(&self, keep: u32) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            ControllerEvent::CleanupFinished(backend.cleanup(keep).await.map_err(AppError::from))
        });
    }

    pub fn shutdown(&mut self) {
        self.stop_tracker();
        self.pending_ticket = None;
    }

    pub fn handle_event(&mut self, event: ControllerEvent, ui: &mut dyn UiProjector) {
        match event {
            ControllerEvent::MetadataLoaded {
                ticket,
                url,
                result,
            } => {
                if !self.accepts(ticket, LifecycleState::FetchingInfo) {
                    debug!(ticket, "discarding stale metadata result");
                    return;
                }
                self.pending_ticket = None;
                match result {
                    Ok(metadata) => {
                        info!(title = %metadata.title, "metadata ready");
                        self.session.source_url = Some(url);
                        self.session.metadata = Some(metadata);
                        self.transition(LifecycleState::InfoReady);
                    }
                    Err(err) => self.fail(err, ui),
                }
            }
            ControllerEvent::DispatchCompleted { ticket, result } => {
                if !self.accepts(ticket, LifecycleState::Starting) {
                    debug!(ticket, "discarding superseded dispatch result");
                    return;
                }
                self.pending_ticket = None;
                match result {
                    Ok(started) => self.begin_tracking(started.download_id),
                    Err(err) => self.fail(err, ui),
                }
            }
            ControllerEvent::Tracker { tracker_id, update } => {
                if self.tracker.as_ref().map(|active| active.id) != Some(tracker_id) {
                    debug!(tracker_id, "discarding update from retired tracker");
                    return;
                }
                match update {
                    TrackerUpdate::Progress(report) => self.apply_progress(report),
                    TrackerUpdate::Succeeded(report) => self.complete(report, ui),
                    TrackerUpdate::Failed(message) => {
                        self.tracker = None;
                        self.fail(AppError::Tracker(message), ui);
                    }
                }
            }
            ControllerEvent::HealthChecked(result) => {
                match result {
                    Ok(report) => info!(status = %report.status, "backend healthy"),
                    Err(err) => {
                        warn!(error = %err, "backend health check failed");
                        if !self.health_warned {
                            self.health_warned = true;
                            ui.notify(Notice::warning(format!(
                                "Download service is not responding: {}",
                                err.user_message()
                            )));
                        }
                    }
                }
                return;
            }
            ControllerEvent::HistoryLoaded(result) => {
                match result {
                    Ok(history) => ui.render_history(&history.downloads),
                    Err(err) => warn!(error = %err, "failed to load download history"),
                }
                return;
            }
            ControllerEvent::StatsLoaded(result) => {
                match result {
                    Ok(stats) => ui.render_stats(&stats),
                    Err(err) => warn!(error = %err, "failed to load server stats"),
                }
                return;
            }
            ControllerEvent::CleanupFinished(result) => {
                match result {
                    Ok(report) => {
                        info!(deleted = report.deleted, "cleanup finished");
                        ui.notify(Notice::info(format!(
                            "Removed {} old file(s), {} kept",
                            report.deleted, report.remaining
                        )));
                        self.refresh_history();
                        self.refresh_stats();
                    }
                    Err(err) => ui.notify(Notice::error(format!(
                        "Cleanup failed: {}",
                        err.user_message()
                    ))),
                }
                return;
            }
        }
        self.render(ui);
    }

    fn begin_tracking(&mut self, download_id: String) {
        // At most one tracker may poll at a time.
        self.stop_tracker();

        self.next_tracker_id += 1;
        let id = self.next_tracker_id;
        self.session.download_id = Some(download_id.clone());
        self.transition(LifecycleState::InProgress);

        let relay = SessionRelay {
            tracker_id: id,
            events: self.events.clone(),
        };
        let mut tracker = ProgressTracker::new(
            download_id,
            Arc::clone(&self.backend),
            self.settings.poll_interval,
            self.runtime.clone(),
            relay,
        );
        tracker.start();
        self.tracker = Some(ActiveTracker { id, tracker });
    }

    fn apply_progress(&mut self, report: StatusReport) {
        let state = self.state();
        if !matches!(
            state,
            LifecycleState::InProgress | LifecycleState::Processing
        ) {
            return;
        }
        self.session.last_progress_snapshot = Some(report.snapshot());
        if report.phase() == ReportedPhase::Processing && state == LifecycleState::InProgress {
            self.transition(LifecycleState::Processing);
        }
    }

    fn complete(&mut self, report: StatusReport, ui: &mut dyn UiProjector) {
        // The tracker already stopped itself.
        self.tracker = None;
        let download_id = self.session.download_id.clone().unwrap_or_default();
        self.session.completed = Some(CompletedDownload {
            download_id,
            filename: report.filename.clone(),
            filesize: report.filesize,
        });
        self.session.last_progress_snapshot = None;
        self.transition(LifecycleState::Succeeded);
        ui.notify(Notice::info(match &report.filename {
            Some(name) => format!("Download complete: {}", name),
            None => "Download complete".to_string(),
        }));
        self.refresh_history();
        self.refresh_stats();
    }

    fn fail(&mut self, err: AppError, ui: &mut dyn UiProjector) {
        let message = err.user_message();
        self.session.last_error = Some(message);
        self.session.last_progress_snapshot = None;
        self.transition(LifecycleState::Failed);
        ui.notify(Notice::error(err.to_string()));
    }

    fn transition(&mut self, to: LifecycleState) {
        let from = self.session.lifecycle_state;
        if from != to {
            info!(%from, %to, download_id = ?self.session.download_id, "session state");
        }
        self.session.lifecycle_state = to;
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.pending_ticket = Some(self.next_ticket);
        self.next_ticket
    }

    fn accepts(&self, ticket: u64, expected: LifecycleState) -> bool {
        self.pending_ticket == Some(ticket) && self.state() == expected
    }

    fn stop_tracker(&mut self) {
        if let Some(mut active) = self.tracker.take() {
            active.tracker.stop();
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ControllerEvent> + Send + 'static,
    {
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let _ = events.send(work.await);
        });
    }
}

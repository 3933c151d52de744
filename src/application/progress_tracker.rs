//! Polls the backend for one download id until it reaches a terminal status.
//!
//! Updates go to a [`TrackerObserver`]. Any number of `Progress` updates may
//! be delivered, followed by at most one `Succeeded` or `Failed`. Once
//! [`ProgressTracker::stop`] returns, the observer hears nothing more from
//! this tracker, even if a status request was already in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{DownloadBackend, ReportedPhase, StatusReport};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

const DEFAULT_FAILURE_MESSAGE: &str = "Download failed";

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// Non-terminal report, delivered as received.
    Progress(StatusReport),
    /// Final report of a completed download.
    Succeeded(StatusReport),
    Failed(String),
}

pub trait TrackerObserver: Send + Sync + 'static {
    fn on_update(&self, update: TrackerUpdate);
}

impl TrackerObserver for mpsc::UnboundedSender<TrackerUpdate> {
    fn on_update(&self, update: TrackerUpdate) {
        let _ = self.send(update);
    }
}

/// Liveness flag checked under a lock at every delivery.
///
/// Closing takes the same lock, so a delivery is either finished before
/// `close` returns or never happens.
#[derive(Debug)]
struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            deliver();
        }
        *open
    }

    /// Deliver and close in one step.
    fn deliver_last(&self, deliver: impl FnOnce()) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        *open = false;
        deliver();
        true
    }
}

enum PollOutcome {
    Continue(StatusReport),
    Terminal(TrackerUpdate),
}

fn classify(result: crate::api::Result<StatusReport>) -> PollOutcome {
    match result {
        Ok(report) => match report.phase() {
            ReportedPhase::Completed => PollOutcome::Terminal(TrackerUpdate::Succeeded(report)),
            ReportedPhase::Error => {
                let message = report
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                PollOutcome::Terminal(TrackerUpdate::Failed(message))
            }
            _ => PollOutcome::Continue(report),
        },
        Err(err) => PollOutcome::Terminal(TrackerUpdate::Failed(err.message)),
    }
}

pub struct ProgressTracker {
    download_id: String,
    backend: Arc<dyn DownloadBackend>,
    poll_interval: Duration,
    runtime: Handle,
    observer: Arc<dyn TrackerObserver>,
    gate: Arc<DeliveryGate>,
    terminated: Arc<AtomicBool>,
    poll_handle: Option<JoinHandle<()>>,
}

impl ProgressTracker {
    pub fn new(
        download_id: impl Into<String>,
        backend: Arc<dyn DownloadBackend>,
        poll_interval: Duration,
        runtime: Handle,
        observer: impl TrackerObserver,
    ) -> Self {
        Self {
            download_id: download_id.into(),
            backend,
            poll_interval,
            runtime,
            observer: Arc::new(observer),
            gate: Arc::new(DeliveryGate::new()),
            terminated: Arc::new(AtomicBool::new(false)),
            poll_handle: None,
        }
    }

    pub fn download_id(&self) -> &str {
        &self.download_id
    }

    /// Begin polling: one request right away, then one per interval.
    ///
    /// Does nothing if polling already started. A tracker is single-use;
    /// once stopped or terminated it cannot be started again.
    pub fn start(&mut self) {
        if self.poll_handle.is_some() || !self.gate.is_open() {
            debug!(download_id = %self.download_id, "tracker already started");
            return;
        }

        let download_id = self.download_id.clone();
        let backend = Arc::clone(&self.backend);
        let observer = Arc::clone(&self.observer);
        let gate = Arc::clone(&self.gate);
        let terminated = Arc::clone(&self.terminated);
        let period = self.poll_interval;

        info!(%download_id, interval_ms = period.as_millis() as u64, "tracking download");

        self.poll_handle = Some(self.runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !gate.is_open() {
                    break;
                }

                let result = backend.get_status(&download_id).await;
                match classify(result) {
                    PollOutcome::Continue(report) => {
                        debug!(%download_id, status = %report.status, "poll");
                        let update = TrackerUpdate::Progress(report);
                        if !gate.deliver(|| observer.on_update(update)) {
                            break;
                        }
                    }
                    PollOutcome::Terminal(update) => {
                        match &update {
                            TrackerUpdate::Failed(message) => {
                                warn!(%download_id, %message, "download failed")
                            }
                            _ => info!(%download_id, "download completed"),
                        }
                        if gate.deliver_last(|| observer.on_update(update)) {
                            terminated.store(true, Ordering::SeqCst);
                        }
                        break;
                    }
                }
            }
        }));
    }

    /// Stop polling and silence the observer. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.gate.close();
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
            debug!(download_id = %self.download_id, "tracker stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
            && self
                .poll_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// True once a success or failure has been delivered.
    pub fn has_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::application::test_support::ScriptedBackend;
    use tokio::time::sleep;

    fn new_tracker(
        backend: &Arc<ScriptedBackend>,
    ) -> (ProgressTracker, mpsc::UnboundedReceiver<TrackerUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend: Arc<dyn DownloadBackend> = backend.clone();
        let tracker = ProgressTracker::new(
            "dl-1",
            backend,
            DEFAULT_POLL_INTERVAL,
            Handle::current(),
            tx,
        );
        (tracker, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TrackerUpdate>) -> Vec<TrackerUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_then_success() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(StatusReport::with_status("starting")));
        backend.push_status(Ok(StatusReport {
            percent: Some("42%".to_string()),
            ..StatusReport::with_status("downloading")
        }));
        backend.push_status(Ok(StatusReport {
            filename: Some("x.mp4".to_string()),
            ..StatusReport::with_status("completed")
        }));

        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_secs(10)).await;

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 3);
        assert!(matches!(&updates[0], TrackerUpdate::Progress(r) if r.status == "starting"));
        assert!(
            matches!(&updates[1], TrackerUpdate::Progress(r) if r.percent.as_deref() == Some("42%"))
        );
        assert!(
            matches!(&updates[2], TrackerUpdate::Succeeded(r) if r.filename.as_deref() == Some("x.mp4"))
        );
        assert_eq!(backend.status_calls(), 3);
        assert!(tracker.has_terminated());
        assert!(!tracker.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_terminal() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(StatusReport::with_status("downloading")));
        backend.push_status(Err(ApiError::new("connection reset")));
        backend.push_status(Ok(StatusReport::with_status("downloading")));

        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_secs(10)).await;

        let updates = drain(&mut rx);
        assert_eq!(
            updates,
            vec![
                TrackerUpdate::Progress(StatusReport::with_status("downloading")),
                TrackerUpdate::Failed("connection reset".to_string()),
            ]
        );
        assert_eq!(backend.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_uses_server_text_or_default() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(StatusReport {
            error: Some("Video unavailable".to_string()),
            ..StatusReport::with_status("error")
        }));
        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(
            drain(&mut rx),
            vec![TrackerUpdate::Failed("Video unavailable".to_string())]
        );

        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(StatusReport::with_status("error")));
        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(
            drain(&mut rx),
            vec![TrackerUpdate::Failed(DEFAULT_FAILURE_MESSAGE.to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_is_immediate_and_start_is_idempotent() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default_status(StatusReport::with_status("downloading"));

        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        tracker.start();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.status_calls(), 1);
        assert!(tracker.is_active());

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(backend.status_calls(), 3);
        assert_eq!(drain(&mut rx).len(), 3);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delivery_after_stop_with_poll_in_flight() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default_status(StatusReport::with_status("completed"));
        backend.set_status_delay(Duration::from_millis(500));

        let (mut tracker, mut rx) = new_tracker(&backend);
        tracker.start();
        // The first request is now waiting on the backend.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.status_calls(), 1);
        tracker.stop();
        tracker.stop();

        sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!tracker.has_terminated());
        assert_eq!(backend.status_calls(), 1);

        tracker.start();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_never_overlap() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default_status(StatusReport::with_status("downloading"));
        backend.set_status_delay(Duration::from_millis(2500));

        let (mut tracker, _rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(backend.max_concurrent_status_calls(), 1);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default_status(StatusReport::with_status("downloading"));

        let (mut tracker, _rx) = new_tracker(&backend);
        tracker.start();
        sleep(Duration::from_millis(10)).await;
        drop(tracker);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.status_calls(), 1);
    }
}

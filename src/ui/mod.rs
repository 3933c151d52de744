use iced::{
    widget::{
        button, column, pick_list, progress_bar, radio, row, scrollable, text, text_input,
        Column, Row, Space,
    },
    Element, Length,
};

use crate::api::{HistoryEntry, ServerStats};
use crate::application::{Notice, NoticeLevel, SessionDetail, SessionView, UiProjector};
use crate::domain::{LifecycleState, MediaKind, VideoQuality};
use crate::utils::{format_bytes, format_duration, format_timestamp, format_upload_date};

/// Main view state
pub struct DownloadView {
    pub url: String,
    pub media_kind: MediaKind,
    pub quality: VideoQuality,
    pub session: SessionView,
    pub notice: Option<Notice>,
    pub history: Vec<HistoryEntry>,
    pub stats: Option<ServerStats>,
    pub save_status: Option<String>,
    pub save_progress: Option<f32>,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            url: String::new(),
            media_kind: MediaKind::Video,
            quality: VideoQuality::Best,
            session: SessionView {
                state: LifecycleState::Idle,
                metadata: None,
                detail: SessionDetail::None,
            },
            notice: None,
            history: Vec::new(),
            stats: None,
            save_status: None,
            save_progress: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    FetchInfoPressed,
    KindSelected(MediaKind),
    QualitySelected(VideoQuality),
    DownloadPressed,
    RetryPressed,
    NewDownloadPressed,
    SavePressed,
    RefreshPressed,
    CleanupPressed,
    DismissNotice,
}

impl UiProjector for DownloadView {
    fn render(&mut self, view: &SessionView) {
        self.session = view.clone();
    }

    fn notify(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    fn render_history(&mut self, entries: &[HistoryEntry]) {
        self.history = entries.to_vec();
    }

    fn render_stats(&mut self, stats: &ServerStats) {
        self.stats = Some(stats.clone());
    }
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.url = url;
            }
            DownloadMessage::KindSelected(kind) => {
                self.media_kind = kind;
            }
            DownloadMessage::QualitySelected(quality) => {
                self.quality = quality;
            }
            DownloadMessage::DismissNotice => {
                self.notice = None;
            }
            DownloadMessage::NewDownloadPressed => {
                self.save_status = None;
                self.save_progress = None;
            }
            _ => {
                // Will be handled by the app
            }
        }
    }

    fn status_message(&self) -> String {
        match (&self.session.state, &self.session.detail) {
            (LifecycleState::Idle, _) => "Paste a video link to get started".to_string(),
            (LifecycleState::FetchingInfo, _) => "Fetching video info...".to_string(),
            (LifecycleState::InfoReady, _) => "Choose a format and start the download".to_string(),
            (LifecycleState::Starting, _) => "Starting download...".to_string(),
            (LifecycleState::InProgress, SessionDetail::Progress(snapshot)) => {
                let mut line = format!(
                    "Downloading: {}",
                    snapshot
                        .percent
                        .map(|p| format!("{:.1}%", p))
                        .unwrap_or_else(|| "...".to_string())
                );
                if let Some(speed) = &snapshot.speed {
                    line.push_str(&format!(" at {}", speed));
                }
                if let Some(eta) = &snapshot.eta {
                    line.push_str(&format!(", ETA {}", eta));
                }
                line
            }
            (LifecycleState::InProgress, _) => "Downloading...".to_string(),
            (LifecycleState::Processing, _) => "Processing file...".to_string(),
            (LifecycleState::Succeeded, SessionDetail::Completed(done)) => {
                let name = done.filename.as_deref().unwrap_or("file");
                match done.filesize {
                    Some(size) => format!("Ready: {} ({})", name, format_bytes(size)),
                    None => format!("Ready: {}", name),
                }
            }
            (LifecycleState::Succeeded, _) => "Download complete".to_string(),
            (LifecycleState::Failed, SessionDetail::Error(message)) => {
                format!("Download failed: {}", message)
            }
            (LifecycleState::Failed, _) => "Download failed".to_string(),
        }
    }

    fn percent(&self) -> f32 {
        match (&self.session.state, &self.session.detail) {
            (_, SessionDetail::Progress(snapshot)) => snapshot.percent.unwrap_or(0.0),
            (LifecycleState::Processing | LifecycleState::Succeeded, _) => 100.0,
            _ => 0.0,
        }
    }

    fn metadata_section(&self) -> Option<Column<'_, DownloadMessage>> {
        let meta = self.session.metadata.as_ref()?;
        let mut details = Vec::new();
        if !meta.uploader.is_empty() {
            details.push(meta.uploader.clone());
        }
        if let Some(duration) = meta.duration {
            details.push(format_duration(duration));
        }
        if let Some(views) = meta.view_count {
            details.push(format!("{} views", views));
        }
        if !meta.upload_date.is_empty() {
            details.push(format_upload_date(&meta.upload_date));
        }

        Some(
            column![
                text(&meta.title).size(20),
                text(details.join(" · ")).size(14),
            ]
            .spacing(4),
        )
    }

    fn history_section(&self) -> Column<'_, DownloadMessage> {
        let mut section = column![row![
            text("Recent downloads").size(18),
            Space::new().width(Length::Fill),
            button("Refresh").on_press(DownloadMessage::RefreshPressed),
            button("Clean up").on_press(DownloadMessage::CleanupPressed),
        ]
        .spacing(10)]
        .spacing(6);

        if let Some(stats) = &self.stats {
            section = section.push(
                text(format!(
                    "{} file(s), {:.2} MB on server, {} active",
                    stats.total_files, stats.total_size_mb, stats.active_downloads
                ))
                .size(12),
            );
        }

        if self.history.is_empty() {
            return section.push(text("No completed downloads yet").size(14));
        }

        for entry in &self.history {
            let size = entry.filesize.map(format_bytes).unwrap_or_default();
            let when = entry
                .completed_at
                .as_deref()
                .map(format_timestamp)
                .unwrap_or_default();
            section = section.push(
                row![
                    text(&entry.title).width(Length::Fill),
                    text(&entry.kind),
                    text(size),
                    text(when),
                ]
                .spacing(12),
            );
        }
        section
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let state = self.session.state;
        let can_fetch = !state.is_active() || state == LifecycleState::FetchingInfo;

        let mut content = column![
            text("Media Downloader").size(32),
            Space::new().height(Length::Fixed(10.0)),
            text("Video URL:").size(16),
            text_input("Paste a video link...", &self.url)
                .on_input(DownloadMessage::UrlChanged)
                .on_submit(DownloadMessage::FetchInfoPressed)
                .padding(10),
            button("Get info")
                .on_press_maybe(can_fetch.then_some(DownloadMessage::FetchInfoPressed))
                .padding([10, 20]),
        ]
        .spacing(10);

        if let Some(meta) = self.metadata_section() {
            content = content.push(meta);
        }

        if matches!(state, LifecycleState::InfoReady | LifecycleState::Starting) {
            let mut options = row![
                radio(
                    "Video",
                    MediaKind::Video,
                    Some(self.media_kind),
                    DownloadMessage::KindSelected
                ),
                radio(
                    "Audio",
                    MediaKind::Audio,
                    Some(self.media_kind),
                    DownloadMessage::KindSelected
                ),
            ]
            .spacing(20);
            if self.media_kind == MediaKind::Video {
                options = options.push(pick_list(
                    &VideoQuality::ALL[..],
                    Some(self.quality),
                    DownloadMessage::QualitySelected,
                ));
            }
            content = content.push(options).push(
                button("Download")
                    .on_press(DownloadMessage::DownloadPressed)
                    .padding([10, 20]),
            );
        }

        if matches!(
            state,
            LifecycleState::InProgress | LifecycleState::Processing | LifecycleState::Succeeded
        ) {
            content = content.push(progress_bar(0.0..=100.0, self.percent()));
        }

        content = content.push(text(self.status_message()).size(14));

        let mut actions = Row::new().spacing(10);
        if state == LifecycleState::Succeeded {
            actions = actions.push(button("Save file").on_press(DownloadMessage::SavePressed));
        }
        if state == LifecycleState::Failed {
            actions = actions.push(button("Retry").on_press(DownloadMessage::RetryPressed));
        }
        if state != LifecycleState::Idle {
            actions =
                actions.push(button("New download").on_press(DownloadMessage::NewDownloadPressed));
        }
        content = content.push(actions);

        if let Some(status) = &self.save_status {
            content = content.push(text(status).size(14));
        }
        if let Some(progress) = self.save_progress {
            content = content.push(progress_bar(0.0..=1.0, progress));
        }

        if let Some(notice) = &self.notice {
            let prefix = match notice.level {
                NoticeLevel::Info => "",
                NoticeLevel::Warning => "Warning: ",
                NoticeLevel::Error => "Error: ",
            };
            content = content.push(
                row![
                    text(format!("{}{}", prefix, notice.message)).width(Length::Fill),
                    button("Dismiss").on_press(DownloadMessage::DismissNotice),
                ]
                .spacing(10),
            );
        }

        content = content
            .push(Space::new().height(Length::Fixed(20.0)))
            .push(self.history_section());

        scrollable(content.padding(20)).into()
    }
}

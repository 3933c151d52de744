use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use iced::Task;
use tokio::runtime::Handle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::api::{ApiClient, DownloadBackend};
use crate::application::{
    ControllerEvent, DownloadController, FileSaver, Notice, SaveEvent, UiProjector,
};
use crate::config::AppConfig;
use crate::domain::AppError;
use crate::ui::{DownloadMessage, DownloadView};

pub struct DownloadApp {
    view: DownloadView,
    controller: DownloadController,
    file_saver: FileSaver,
    keep_files: u32,
    is_saving: bool,
}

impl DownloadApp {
    pub fn new(config: AppConfig, runtime: Handle) -> (Self, Task<Message>) {
        let api_client = ApiClient::new(config.api.clone());
        let backend: Arc<dyn DownloadBackend> = Arc::new(api_client.clone());
        let (controller, events) =
            DownloadController::new(backend, runtime, config.controller.clone());

        let mut view = DownloadView::default();
        controller.render(&mut view);
        controller.check_health();
        controller.refresh_history();
        controller.refresh_stats();

        let app = Self {
            view,
            controller,
            file_saver: FileSaver::new(api_client),
            keep_files: config.keep_files,
            is_saving: false,
        };

        // Every controller event comes back through update() in arrival order.
        let events = Task::stream(UnboundedReceiverStream::new(events).map(Message::Controller));

        (app, events)
    }

    fn report(&mut self, result: Result<(), AppError>) {
        if let Err(err) = result {
            warn!(error = %err, "action rejected");
            self.view.notify(Notice::warning(err.to_string()));
        }
    }

    fn handle_ui(&mut self, message: DownloadMessage) -> Task<Message> {
        self.view.update(message.clone());

        match message {
            DownloadMessage::FetchInfoPressed => {
                let url = self.view.url.clone();
                let result = self.controller.fetch_info(&url, &mut self.view);
                self.report(result);
            }
            DownloadMessage::DownloadPressed => {
                let (kind, quality) = (self.view.media_kind, self.view.quality);
                let result = self
                    .controller
                    .start_download(kind, Some(quality), &mut self.view);
                self.report(result);
            }
            DownloadMessage::RetryPressed => {
                let result = self.controller.retry(&mut self.view);
                self.report(result);
            }
            DownloadMessage::NewDownloadPressed => {
                self.controller.new_download(&mut self.view);
            }
            DownloadMessage::SavePressed => {
                if self.is_saving {
                    return Task::none();
                }
                let session = self.controller.session();
                if let Some(completed) = &session.completed {
                    let suggested = FileSaver::suggested_filename(
                        completed,
                        session.metadata.as_ref().map(|m| m.title.as_str()),
                        session.media_kind,
                    );
                    let saver = self.file_saver.clone();
                    self.view.save_status = Some("Please select save location...".to_string());

                    return Task::perform(
                        async move { saver.choose_save_path(suggested).await },
                        Message::SaveLocationChosen,
                    );
                }
            }
            DownloadMessage::RefreshPressed => {
                self.controller.refresh_history();
                self.controller.refresh_stats();
            }
            DownloadMessage::CleanupPressed => {
                self.controller.cleanup(self.keep_files);
            }
            DownloadMessage::UrlChanged(_)
            | DownloadMessage::KindSelected(_)
            | DownloadMessage::QualitySelected(_)
            | DownloadMessage::DismissNotice => {}
        }
        Task::none()
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    Controller(ControllerEvent),
    /// Path picked in the save dialog, if any
    SaveLocationChosen(Option<PathBuf>),
    Save(SaveEvent),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => return app.handle_ui(ui_msg),
        Message::Controller(event) => {
            app.controller.handle_event(event, &mut app.view);
        }
        Message::SaveLocationChosen(path_opt) => {
            let download_id = app
                .controller
                .session()
                .completed
                .as_ref()
                .map(|c| c.download_id.clone());

            match (path_opt, download_id) {
                (Some(path), Some(download_id)) => {
                    app.is_saving = true;
                    app.view.save_status = Some(format!("Saving to: {}", path.display()));
                    app.view.save_progress = Some(0.0);
                    return Task::stream(
                        app.file_saver
                            .save_stream(download_id, path)
                            .map(Message::Save),
                    );
                }
                (None, _) => {
                    // User cancelled dialog
                    app.view.save_status = Some("Save cancelled".to_string());
                }
                (Some(_), None) => {
                    app.view.save_status = None;
                }
            }
        }
        Message::Save(event) => match event {
            SaveEvent::Progress(progress) => {
                app.view.save_progress = Some(progress);
            }
            SaveEvent::Completed(path) => {
                info!(path = %path.display(), "file saved");
                app.is_saving = false;
                app.view.save_progress = None;
                app.view.save_status = Some(format!("Saved: {}", path.display()));
            }
            SaveEvent::Failed(err) => {
                warn!(error = %err, "saving file failed");
                app.is_saving = false;
                app.view.save_progress = None;
                app.view.save_status = Some(format!("Save failed: {}", err));
            }
        },
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

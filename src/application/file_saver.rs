use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream},
    FutureExt, StreamExt,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::{
    api::ApiClient,
    domain::{AppError, CompletedDownload, MediaKind},
    utils::{display_filename, sanitize_filename},
};

#[derive(Debug, Clone)]
pub enum SaveEvent {
    /// Fraction written, 0.0 to 1.0; stays at 0.0 when the size is unknown.
    Progress(f32),
    Completed(PathBuf),
    Failed(AppError),
}

/// Copies a finished download from the backend to a local file.
#[derive(Clone)]
pub struct FileSaver {
    api_client: ApiClient,
}

impl FileSaver {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    /// Name offered in the save dialog.
    pub fn suggested_filename(
        completed: &CompletedDownload,
        title: Option<&str>,
        kind: MediaKind,
    ) -> String {
        if let Some(stored) = &completed.filename {
            let name = sanitize_filename(&display_filename(stored, &completed.download_id));
            if !name.is_empty() {
                return name;
            }
        }

        let stem = sanitize_filename(title.unwrap_or("download"))
            .trim_matches(|c| c == '.' || c == ' ')
            .to_string();
        let extension = match kind {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        };
        format!("{}.{}", stem, extension)
    }

    pub async fn choose_save_path(&self, suggested_filename: String) -> Option<PathBuf> {
        rfd::AsyncFileDialog::new()
            .set_file_name(&suggested_filename)
            .save_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }

    pub fn save_stream(&self, download_id: String, path: PathBuf) -> BoxStream<'static, SaveEvent> {
        let client = self.api_client.clone();
        info!(%download_id, path = %path.display(), "saving file");
        let source = async move { client.download_file_stream(&download_id).await }.boxed();
        write_file(source, path)
    }
}

type ByteStream = BoxStream<'static, crate::api::Result<Bytes>>;
type FileSource = BoxFuture<'static, crate::api::Result<(Option<u64>, ByteStream)>>;

/// Writes the bytes from `source` to `path`.
///
/// The file is only created once the backend has answered, and a failed
/// transfer removes whatever was written.
fn write_file(source: FileSource, path: PathBuf) -> BoxStream<'static, SaveEvent> {
    stream::unfold(SaveState::Start { source, path }, |state| async move {
        match state {
            SaveState::Start { source, path } => {
                let (total, stream) = match source.await {
                    Ok(opened) => opened,
                    Err(e) => {
                        return Some((SaveEvent::Failed(AppError::from(e)), SaveState::Finished))
                    }
                };

                match tokio::fs::File::create(&path).await {
                    Ok(file) => Some((
                        SaveEvent::Progress(0.0),
                        SaveState::Writing {
                            file,
                            stream,
                            written: 0,
                            total,
                            path,
                        },
                    )),
                    Err(e) => Some((
                        SaveEvent::Failed(AppError::Io(format!("Failed to create file: {}", e))),
                        SaveState::Finished,
                    )),
                }
            }
            SaveState::Writing {
                mut file,
                mut stream,
                mut written,
                total,
                path,
            } => match stream.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = file.write_all(&chunk).await {
                        discard(file, &path).await;
                        return Some((
                            SaveEvent::Failed(AppError::Io(format!("Write error: {}", e))),
                            SaveState::Finished,
                        ));
                    }

                    written += chunk.len() as u64;

                    let progress = match total {
                        Some(total_size) if total_size > 0 => written as f32 / total_size as f32,
                        _ => 0.0,
                    };

                    Some((
                        SaveEvent::Progress(progress),
                        SaveState::Writing {
                            file,
                            stream,
                            written,
                            total,
                            path,
                        },
                    ))
                }
                Some(Err(e)) => {
                    warn!(error = %e, "file transfer interrupted");
                    discard(file, &path).await;
                    Some((SaveEvent::Failed(AppError::from(e)), SaveState::Finished))
                }
                None => {
                    if let Err(e) = file.sync_all().await {
                        discard(file, &path).await;
                        return Some((
                            SaveEvent::Failed(AppError::Io(format!(
                                "Failed to sync file: {}",
                                e
                            ))),
                            SaveState::Finished,
                        ));
                    }

                    Some((SaveEvent::Completed(path), SaveState::Finished))
                }
            },
            SaveState::Finished => None,
        }
    })
    .boxed()
}

/// Close and delete a partially written file.
async fn discard(file: tokio::fs::File, path: &Path) {
    drop(file);
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "could not remove partial file");
    }
}

enum SaveState {
    Start {
        source: FileSource,
        path: PathBuf,
    },
    Writing {
        file: tokio::fs::File,
        stream: ByteStream,
        written: u64,
        total: Option<u64>,
        path: PathBuf,
    },
    Finished,
}

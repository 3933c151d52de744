use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::backend::DownloadBackend;
use super::models::{
    ApiConfig, CleanupReport, CleanupRequest, ErrorBody, HealthReport, History, InfoRequest,
    ServerStats, StartDownloadRequest, StartedDownload, StatusReport, VideoMetadata,
};
use crate::domain::{MediaKind, VideoQuality};

/// Every gateway failure, transport or server-reported, in one shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Endpoint whose last path segment is a download id.
    fn endpoint_for(&self, path: &str, download_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint(path))
            .map_err(|e| ApiError::new(format!("Invalid API address: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::new("Invalid API address"))?
            .pop_if_empty()
            .push(download_id);
        Ok(url)
    }

    /// Send one request and decode a successful JSON body.
    ///
    /// Non-success responses become an `ApiError` carrying the server's
    /// `error` field when it has one.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let server_message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .filter(|message| !message.trim().is_empty());
            let message = server_message
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            debug!(status = status.as_u16(), %message, "request failed");
            return Err(ApiError::new(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::new(format!("Invalid response: {}", e)))
    }

    pub async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        debug!(%url, "fetching metadata");
        let request = self
            .http
            .post(self.endpoint(&self.config.paths.info))
            .json(&InfoRequest { url });
        self.send_json(request).await
    }

    pub async fn start_download(
        &self,
        url: &str,
        kind: MediaKind,
        quality: Option<VideoQuality>,
    ) -> Result<StartedDownload> {
        let body = StartDownloadRequest::new(url, kind, quality, &self.config.audio_format);
        debug!(%url, ?kind, quality = ?body.quality, "starting download");
        let request = self
            .http
            .post(self.endpoint(&self.config.paths.download))
            .json(&body);
        self.send_json(request).await
    }

    pub async fn get_status(&self, download_id: &str) -> Result<StatusReport> {
        let url = self.endpoint_for(&self.config.paths.progress, download_id)?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_history(&self) -> Result<History> {
        let request = self.http.get(self.endpoint(&self.config.paths.downloads));
        self.send_json(request).await
    }

    pub async fn get_stats(&self) -> Result<ServerStats> {
        let request = self.http.get(self.endpoint(&self.config.paths.stats));
        self.send_json(request).await
    }

    pub async fn cleanup(&self, keep: u32) -> Result<CleanupReport> {
        let request = self
            .http
            .post(self.endpoint(&self.config.paths.cleanup))
            .json(&CleanupRequest { keep });
        self.send_json(request).await
    }

    pub async fn health_check(&self) -> Result<HealthReport> {
        let request = self.http.get(self.endpoint(&self.config.paths.health));
        let report: HealthReport = self.send_json(request).await?;
        if report.status != "healthy" {
            return Err(ApiError::new(format!(
                "Backend reported status '{}'",
                report.status
            )));
        }
        Ok(report)
    }

    /// Address of a finished file on the backend
    pub fn file_url(&self, download_id: &str) -> Result<Url> {
        self.endpoint_for(&self.config.paths.file, download_id)
    }

    /// Stream a finished file from the backend.
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_id: &str,
    ) -> Result<(Option<u64>, BoxStream<'static, Result<bytes::Bytes>>)> {
        let url = self.file_url(download_id)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ApiError::new(message));
        }

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::from).boxed();

        Ok((total_size, stream))
    }
}

#[async_trait]
impl DownloadBackend for ApiClient {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        ApiClient::fetch_metadata(self, url).await
    }

    async fn start_download(
        &self,
        url: &str,
        kind: MediaKind,
        quality: Option<VideoQuality>,
    ) -> Result<StartedDownload> {
        ApiClient::start_download(self, url, kind, quality).await
    }

    async fn get_status(&self, download_id: &str) -> Result<StatusReport> {
        ApiClient::get_status(self, download_id).await
    }

    async fn list_history(&self) -> Result<History> {
        ApiClient::list_history(self).await
    }

    async fn get_stats(&self) -> Result<ServerStats> {
        ApiClient::get_stats(self).await
    }

    async fn cleanup(&self, keep: u32) -> Result<CleanupReport> {
        ApiClient::cleanup(self, keep).await
    }

    async fn health_check(&self) -> Result<HealthReport> {
        ApiClient::health_check(self).await
    }
}

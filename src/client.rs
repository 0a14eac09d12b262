//! HTTP client for the answer gateway
//!
//! Every service mode is a POST of `{"question", "chatId"?}` to its own
//! route; the response body is a chunked SSE-style stream. Failures before
//! the body is handed out are [`QaError::Connection`] and may be retried
//! with exponential backoff. Nothing is retried once streaming has begun.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{Config, RetryConfig, ServiceConfig};
use crate::error::{QaError, Result};
use crate::service::{ServiceMode, HEALTH_PATH, UPLOAD_PATH};

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Question payload sent to every answer route
#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    question: &'a str,
    #[serde(rename = "chatId", skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
}

/// Upload route response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    /// Human readable status
    #[serde(default)]
    pub message: Option<String>,
    /// Names of the stored files
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Number of files stored
    #[serde(default)]
    pub count: Option<u64>,
    /// Failure reported with a success status
    #[serde(default)]
    pub error: Option<String>,
}

/// A failed connection attempt
#[derive(Debug)]
struct ConnectFailure {
    message: String,
    retryable: bool,
}

/// Client for the gateway routes
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ServiceClient {
    /// Build a client for `service` using `retry` for the connect phase
    ///
    /// # Errors
    ///
    /// Returns [`QaError::Config`] if the HTTP client cannot be constructed
    pub fn new(service: &ServiceConfig, retry: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(service.timeout_seconds))
            .connect_timeout(Duration::from_secs(service.connect_timeout_seconds))
            .build()
            .map_err(|e| QaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: service.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Build a client from the full configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.service, config.retry.clone())
    }

    /// Gateway base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `question` to the route of `mode` and return the response body
    ///
    /// Transport errors, `429` and `5xx` responses are retried according to
    /// the retry policy; other statuses fail immediately.
    ///
    /// # Errors
    ///
    /// Returns [`QaError::Connection`] when no successful response with a
    /// body could be obtained.
    pub async fn open_stream(
        &self,
        question: &str,
        mode: ServiceMode,
        chat_id: Option<&str>,
    ) -> Result<ByteStream> {
        let url = self.url(mode.endpoint());
        let request = AnswerRequest { question, chat_id };

        let mut attempt = 0u32;
        loop {
            match self.connect_once(&url, &request).await {
                Ok(response) => {
                    tracing::debug!("Connected to {} ({})", url, response.status());
                    return Ok(Box::pin(response.bytes_stream()));
                }
                Err(failure) if failure.retryable && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        "Connect to {} failed ({}); retry {}/{} in {:?}",
                        url,
                        failure.message,
                        attempt,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    tracing::error!("Connect to {} failed: {}", url, failure.message);
                    return Err(QaError::Connection(failure.message).into());
                }
            }
        }
    }

    async fn connect_once(
        &self,
        url: &str,
        request: &AnswerRequest<'_>,
    ) -> std::result::Result<reqwest::Response, ConnectFailure> {
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ConnectFailure {
                message: format!("request failed: {}", e),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body.trim())
            };
            return Err(ConnectFailure {
                message,
                retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Err(ConnectFailure {
                message: "response has no body".to_string(),
                retryable: false,
            });
        }

        Ok(response)
    }

    /// Upload `paths` as a multipart form with one `files` field per file
    ///
    /// # Errors
    ///
    /// Returns [`QaError::Io`] when a file cannot be read and
    /// [`QaError::Upload`] carrying the server's text when the upload is
    /// rejected.
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<UploadResponse> {
        let mut form = reqwest::multipart::Form::new();
        for path in paths {
            let data = tokio::fs::read(path).await.map_err(QaError::Io)?;
            let part = reqwest::multipart::Part::bytes(data)
                .file_name(file_name(path))
                .mime_str(guess_mime(path))
                .map_err(|e| QaError::Upload(e.to_string()))?;
            form = form.part("files", part);
        }

        let url = self.url(UPLOAD_PATH);
        tracing::info!("Uploading {} file(s) to {}", paths.len(), url);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| QaError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                format!("HTTP error! Status: {}", status.as_u16())
            } else {
                text
            };
            return Err(QaError::Upload(message).into());
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| QaError::Upload(format!("Failed to parse upload response: {}", e)))?;
        if let Some(error) = &body.error {
            return Err(QaError::Upload(error.clone()).into());
        }
        Ok(body)
    }

    /// Probe the gateway root
    ///
    /// # Errors
    ///
    /// Returns [`QaError::Connection`] when the gateway cannot be reached
    pub async fn health(&self) -> Result<bool> {
        let response = self
            .http
            .get(self.url(HEALTH_PATH))
            .send()
            .await
            .map_err(|e| QaError::Connection(format!("health check failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

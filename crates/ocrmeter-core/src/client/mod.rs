pub mod monitor;

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::OcrmeterError;

// ---------------------------------------------------------------------------
// Remote API shapes
// ---------------------------------------------------------------------------

/// Task lifecycle states reported by the remote OCR service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Response to a document submission: `{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskSubmission {
    pub task_id: String,
}

/// Response to a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskStatusResponse {
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One server-sent event from the processing stream. All fields are optional;
/// the service interleaves progress, text chunks, and status updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulated_text: Option<String>,
}

// ---------------------------------------------------------------------------
// RemoteConfig — environment-driven client settings
// ---------------------------------------------------------------------------

/// Connection settings for the deployment under test.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Read settings from `OCRMETER_BASE_URL`, `OCRMETER_AUTH_TOKEN`, and
    /// `OCRMETER_TIMEOUT_SECS`, falling back to a local deployment.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OCRMETER_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let auth_token = std::env::var("OCRMETER_AUTH_TOKEN").ok();
        let timeout = std::env::var("OCRMETER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        Self {
            base_url,
            auth_token,
            timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// OcrClient
// ---------------------------------------------------------------------------

/// Thin wrapper around a reqwest Client bound to one OCR deployment.
#[derive(Debug)]
pub struct OcrClient {
    inner: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

/// Builder for [`OcrClient`].
pub struct OcrClientBuilder {
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
    user_agent: String,
}

impl OcrClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("ocrmeter/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn build(self) -> Result<OcrClient, OcrmeterError> {
        if self.base_url.is_empty() {
            return Err(OcrmeterError::Validation(
                "base URL must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(OcrClient {
            inner: client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth_token: self.auth_token,
        })
    }
}

impl OcrClient {
    pub fn builder(base_url: impl Into<String>) -> OcrClientBuilder {
        OcrClientBuilder::new(base_url)
    }

    /// Build a client from [`RemoteConfig`].
    pub fn from_config(config: &RemoteConfig) -> Result<Self, OcrmeterError> {
        let mut builder = Self::builder(&config.base_url).timeout(config.timeout);
        if let Some(token) = &config.auth_token {
            builder = builder.auth_token(token.clone());
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Submit a document for OCR and return the created task id along with
    /// the HTTP round-trip time in seconds.
    pub async fn submit_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mode: &str,
    ) -> Result<(TaskSubmission, f64), OcrmeterError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("mode", mode.to_string());

        let start = Instant::now();
        let response = self
            .with_auth(self.inner.post(self.url("/v1/ocr/process")))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let submission: TaskSubmission = response.json().await?;
        let elapsed = start.elapsed().as_secs_f64();

        Ok((submission, elapsed))
    }

    /// Poll the status of a task.
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, OcrmeterError> {
        let response = self
            .with_auth(self.inner.get(self.url(&format!("/v1/ocr/status/{task_id}"))))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Consume the server-sent event stream for a task until it closes,
    /// returning every decoded event. Lines that are not `data:` payloads or
    /// fail to parse are skipped.
    pub async fn stream_events(&self, task_id: &str) -> Result<Vec<StreamEvent>, OcrmeterError> {
        let response = self
            .with_auth(
                self.inner
                    .get(self.url(&format!("/v1/ocr/process-stream/{task_id}"))),
            )
            .send()
            .await?
            .error_for_status()?;

        let mut events = Vec::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            decode_sse_chunk(&mut buffer, &chunk?, &mut events);
        }
        Ok(events)
    }
}

/// Feed one raw chunk into the SSE line decoder. Complete lines are consumed
/// from `buffer`; a trailing partial line stays buffered for the next chunk.
/// Only `data:` lines with a valid JSON payload produce events, everything
/// else (comments, event names, malformed payloads) is skipped.
fn decode_sse_chunk(buffer: &mut String, chunk: &[u8], events: &mut Vec<StreamEvent>) {
    buffer.push_str(&String::from_utf8_lossy(chunk));
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim().to_string();
        buffer.drain(..=pos);
        if let Some(payload) = line.strip_prefix("data:") {
            if let Ok(event) = serde_json::from_str::<StreamEvent>(payload.trim()) {
                events.push(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // builder
    // -----------------------------------------------------------------------

    #[test]
    fn builder_with_defaults_builds() {
        let client = OcrClient::builder("http://localhost:8000").build();
        assert!(client.is_ok());
    }

    #[test]
    fn builder_strips_trailing_slash() {
        let client = OcrClient::builder("http://localhost:8000/")
            .build()
            .expect("build");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/v1/ocr/process"), "http://localhost:8000/v1/ocr/process");
    }

    #[test]
    fn builder_rejects_empty_base_url() {
        let err = OcrClient::builder("").build().expect_err("must fail");
        assert!(matches!(err, OcrmeterError::Validation(_)));
    }

    #[test]
    fn builder_with_all_options() {
        let client = OcrClient::builder("https://ocr.example.com")
            .auth_token("secret")
            .timeout(Duration::from_secs(60))
            .user_agent("ocrmeter-test")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn from_config_builds() {
        let config = RemoteConfig {
            base_url: "http://localhost:8000".to_string(),
            auth_token: Some("token".to_string()),
            timeout: Duration::from_secs(10),
        };
        assert!(OcrClient::from_config(&config).is_ok());
    }

    // -----------------------------------------------------------------------
    // wire shapes
    // -----------------------------------------------------------------------

    #[test]
    fn task_submission_parses() {
        let parsed: TaskSubmission =
            serde_json::from_str(r#"{"task_id": "abc-123"}"#).expect("parse");
        assert_eq!(parsed.task_id, "abc-123");
    }

    #[test]
    fn task_status_parses_minimal_and_full() {
        let minimal: TaskStatusResponse =
            serde_json::from_str(r#"{"status": "pending"}"#).expect("parse minimal");
        assert_eq!(minimal.status, TaskState::Pending);
        assert!(minimal.result.is_none());
        assert!(minimal.error.is_none());

        let full: TaskStatusResponse = serde_json::from_str(
            r#"{"status": "completed", "progress_percentage": 100.0,
                "result": {"text": "hello"}, "error": null}"#,
        )
        .expect("parse full");
        assert_eq!(full.status, TaskState::Completed);
        assert_eq!(full.progress_percentage, Some(100.0));
        assert_eq!(full.result.as_ref().and_then(|r| r["text"].as_str()), Some("hello"));
    }

    #[test]
    fn task_status_failed_carries_error() {
        let failed: TaskStatusResponse = serde_json::from_str(
            r#"{"status": "failed", "error": "unsupported file type"}"#,
        )
        .expect("parse failed");
        assert_eq!(failed.status, TaskState::Failed);
        assert_eq!(failed.error.as_deref(), Some("unsupported file type"));
    }

    #[test]
    fn stream_event_parses_partial_shapes() {
        let progress: StreamEvent =
            serde_json::from_str(r#"{"progress_percentage": 42.0}"#).expect("parse");
        assert_eq!(progress.progress_percentage, Some(42.0));
        assert!(progress.status.is_none());

        let chunk: StreamEvent = serde_json::from_str(
            r#"{"text_chunk": "lorem", "accumulated_text": "lorem"}"#,
        )
        .expect("parse");
        assert_eq!(chunk.text_chunk.as_deref(), Some("lorem"));

        let status: StreamEvent =
            serde_json::from_str(r#"{"status": "processing"}"#).expect("parse");
        assert_eq!(status.status, Some(TaskState::Processing));
    }

    // -----------------------------------------------------------------------
    // SSE decoding
    // -----------------------------------------------------------------------

    fn decode_all(chunks: &[&str]) -> (Vec<StreamEvent>, String) {
        let mut buffer = String::new();
        let mut events = Vec::new();
        for chunk in chunks {
            decode_sse_chunk(&mut buffer, chunk.as_bytes(), &mut events);
        }
        (events, buffer)
    }

    #[test]
    fn sse_decoder_reassembles_lines_split_across_chunks() {
        let (events, buffer) = decode_all(&[
            "data: {\"progress_per",
            "centage\": 50.0}\ndata: {\"status\": \"proc",
            "essing\"}\n",
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].progress_percentage, Some(50.0));
        assert_eq!(events[1].status, Some(TaskState::Processing));
        assert!(buffer.is_empty());
    }

    #[test]
    fn sse_decoder_keeps_trailing_partial_line_buffered() {
        let (events, buffer) = decode_all(&["data: {\"progress_percentage\": 10.0}\ndata: {\"pro"]);
        assert_eq!(events.len(), 1);
        assert_eq!(buffer, "data: {\"pro");
    }

    #[test]
    fn sse_decoder_skips_non_data_lines() {
        let (events, _) = decode_all(&[
            ": keep-alive\nevent: progress\n\ndata: {\"progress_percentage\": 99.0}\n",
        ]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].progress_percentage, Some(99.0));
    }

    #[test]
    fn sse_decoder_skips_malformed_payloads() {
        let (events, _) = decode_all(&[
            "data: not json at all\ndata: {\"status\": \"completed\"}\ndata: {broken\n",
        ]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, Some(TaskState::Completed));
    }

    #[test]
    fn task_state_snake_case_round_trip() {
        for (state, text) in [
            (TaskState::Pending, "\"pending\""),
            (TaskState::Queued, "\"queued\""),
            (TaskState::Processing, "\"processing\""),
            (TaskState::Completed, "\"completed\""),
            (TaskState::Failed, "\"failed\""),
        ] {
            assert_eq!(serde_json::to_string(&state).expect("serialize"), text);
        }
    }
}

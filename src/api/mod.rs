// Answer service client

pub mod decode;
pub mod frames;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Ask request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream interrupted: {0}")]
    Transport(String),

    #[error("No data received for {0:?}")]
    Stalled(Duration),
}

impl ApiError {
    /// True when the session never got a usable stream, which is the only case the
    /// offline fallback may stand in for.
    pub const fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Status { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            user_id: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Pull-based byte source. `next_chunk` is the pump's only suspension point.
pub trait ChunkSource: Send {
    /// `Ok(None)` is end of stream.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, ApiError>> + Send;
}

/// An open answer stream for one question. Dropping it closes the connection.
#[derive(Debug)]
pub struct AnswerStream {
    response: Response,
}

impl ChunkSource for AnswerStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        match self.response.chunk().await {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(ApiError::Transport(e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskClient {
    base_url: String,
    client: Client,
}

impl AskClient {
    /// `connect_timeout` bounds connection establishment only; a streamed answer
    /// may legitimately run for minutes.
    pub fn new(base_url: impl Into<String>, connect_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn ask_url(&self) -> String {
        format!("{}/api/ask", self.base_url)
    }

    /// Open the answer stream for `request`. Both an unreachable endpoint and a
    /// non-success status count as connection failures.
    pub async fn ask(&self, request: &AskRequest) -> Result<AnswerStream, ApiError> {
        let url = self.ask_url();

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        debug!(url = %url, "Answer stream opened");
        Ok(AnswerStream { response })
    }
}

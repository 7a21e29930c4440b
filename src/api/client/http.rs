//! HTTP client for the heartree proxy endpoints

use reqwest::{Client as ReqwestClient, Error as ReqwestError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Client;
use crate::models::{
    ChatRequest, ChatResponse, IdeaNode, IdeaRequest, IdeaResponse, ImageJob, ImageRequest,
    PollResponse, SpeechRequest, TreeRequest,
};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Error body returned by the proxy endpoints
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// HTTP implementation of [`Client`]
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: ReqwestClient,
    config: ClientConfig,
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: ReqwestClient::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.http_client.post(self.url(path)).json(body).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Turns a non-2xx response into [`ClientError::Status`], keeping the server's message
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or(text);
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl Default for HttpClientImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Client for HttpClientImpl {
    async fn generate_tree(&self, prompt: &str) -> Result<Vec<IdeaNode>, ClientError> {
        let request = TreeRequest {
            prompt: prompt.to_string(),
        };
        self.post_json("/api/generate-tree", &request).await
    }

    async fn generate_idea(&self, request: &IdeaRequest) -> Result<String, ClientError> {
        let response: IdeaResponse = self.post_json("/api/generate", request).await?;
        Ok(response.text)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        let response: ChatResponse = self.post_json("/api/chat", request).await?;
        Ok(response.response)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageJob, ClientError> {
        self.post_json("/api/generate-image", request).await
    }

    async fn poll_image(&self, job: &ImageJob) -> Result<PollResponse, ClientError> {
        // The job id is the provider's poll URL
        let response = self.http_client.get(&job.request_id).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        let request = SpeechRequest {
            text: text.to_string(),
        };
        let response = self
            .http_client
            .post(self.url("/api/text-to-speech"))
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let audio = response.bytes().await?;

        if audio.is_empty() {
            return Err(ClientError::MissingData);
        }
        Ok(audio.to_vec())
    }
}

//! In-process client implementation
//!
//! This module provides a client that calls [`Services`] directly, offering the same
//! interface as `HttpClientImpl` without a round trip through the proxy.

use super::{Client, ClientError};
use crate::models::{ChatRequest, IdeaNode, IdeaRequest, ImageJob, ImageRequest, PollResponse};
use crate::upstream::{ChatModel, Services, UpstreamError};

/// A client implementation that wraps Services directly
#[derive(Clone)]
pub struct ServiceClient {
    services: Services,
    chat_model: ChatModel,
}

impl ServiceClient {
    /// Create a new ServiceClient answering chats with the primary chat model
    pub fn new(services: Services) -> Self {
        Self {
            services,
            chat_model: ChatModel::Primary,
        }
    }

    /// Use a different model for chat replies
    pub fn with_chat_model(mut self, chat_model: ChatModel) -> Self {
        self.chat_model = chat_model;
        self
    }
}

/// Convert UpstreamError to ClientError for interface compatibility
impl From<UpstreamError> for ClientError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Http(e) => ClientError::Http(e),
            UpstreamError::Status { status, body } => ClientError::Status {
                status,
                message: body,
            },
            UpstreamError::Malformed(msg) => ClientError::Upstream(msg),
            UpstreamError::InvalidRequest(msg) => ClientError::Api(msg),
        }
    }
}

#[async_trait::async_trait]
impl Client for ServiceClient {
    async fn generate_tree(&self, prompt: &str) -> Result<Vec<IdeaNode>, ClientError> {
        self.services
            .generate_tree(prompt)
            .await
            .map_err(ClientError::from)
    }

    async fn generate_idea(&self, request: &IdeaRequest) -> Result<String, ClientError> {
        self.services
            .generate_idea(request)
            .await
            .map_err(ClientError::from)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        self.services
            .chat(request, self.chat_model)
            .await
            .map_err(ClientError::from)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageJob, ClientError> {
        self.services
            .generate_image(request)
            .await
            .map_err(ClientError::from)
    }

    async fn poll_image(&self, job: &ImageJob) -> Result<PollResponse, ClientError> {
        self.services
            .poll_image(&job.request_id)
            .await
            .map_err(ClientError::from)
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        self.services
            .text_to_speech(text)
            .await
            .map_err(ClientError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::fakes::{services, ScriptedModel};

    #[tokio::test]
    async fn test_service_client_routes_chat_model() {
        let client = ServiceClient::new(services(
            ScriptedModel::replying(vec![Ok(Some("from llama".to_string()))]),
            ScriptedModel::replying(vec![Ok(Some("from primary".to_string()))]),
        ));
        let request = ChatRequest {
            message: "hi".to_string(),
            context: "Venue".to_string(),
            message_history: vec![],
        };

        assert_eq!(client.chat(&request).await.unwrap(), "from primary");
        let llama = client.clone().with_chat_model(ChatModel::Llama);
        assert_eq!(llama.chat(&request).await.unwrap(), "from llama");
    }

    #[tokio::test]
    async fn test_upstream_errors_convert() {
        let client = ServiceClient::new(services(
            ScriptedModel::replying(vec![Err("overloaded".to_string())]),
            ScriptedModel::default(),
        ));
        let request = IdeaRequest {
            context: "root".to_string(),
            current_node: "root".to_string(),
            depth: 0,
        };

        match client.generate_idea(&request).await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

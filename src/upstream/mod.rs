//! Upstream provider module
//!
//! Thin reqwest clients for the hosted language-model, image and speech services,
//! and the [`Services`] bundle that the proxy endpoints are built on.

mod elevenlabs;
mod flux;
mod openai;

use std::sync::Arc;

pub use elevenlabs::ElevenLabsClient;
pub use flux::FluxClient;
pub use openai::ChatCompletionClient;

use crate::config::ServiceConfig;
use crate::ideas::parse_tree_reply;
use crate::models::{ChatRequest, IdeaNode, IdeaRequest, ImageJob, ImageRequest, PollResponse};
use crate::prompts;

/// Errors raised while talking to an upstream provider
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Role of a chat-completion message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sampling {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
}

/// A hosted chat-completion model
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the first choice's content, or `None` when the model replied with nothing
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        sampling: Sampling,
    ) -> Result<Option<String>, UpstreamError>;
}

/// A hosted asynchronous image generator
#[async_trait::async_trait]
pub trait ImageService: Send + Sync {
    /// Submits a job and returns its poll URL
    async fn submit(&self, prompt: &str) -> Result<String, UpstreamError>;

    async fn poll(&self, poll_url: &str) -> Result<PollResponse, UpstreamError>;
}

/// A hosted text-to-speech service
#[async_trait::async_trait]
pub trait SpeechService: Send + Sync {
    /// Returns audio/mpeg bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, UpstreamError>;
}

/// Which chat model should answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModel {
    Primary,
    /// The idea model, served on the secondary chat route
    Llama,
}

/// Upstream providers, constructed once at startup and shared by every request
#[derive(Clone)]
pub struct Services {
    idea_model: Arc<dyn LanguageModel>,
    chat_model: Arc<dyn LanguageModel>,
    images: Arc<dyn ImageService>,
    speech: Arc<dyn SpeechService>,
}

impl Services {
    pub fn new(
        idea_model: Arc<dyn LanguageModel>,
        chat_model: Arc<dyn LanguageModel>,
        images: Arc<dyn ImageService>,
        speech: Arc<dyn SpeechService>,
    ) -> Self {
        Self {
            idea_model,
            chat_model,
            images,
            speech,
        }
    }

    /// Builds the real providers from configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        let http = reqwest::Client::new();
        for (name, key) in [
            ("NEBIUS_API_KEY", &config.nebius_api_key),
            ("OPENAI_API_KEY", &config.openai_api_key),
            ("BLACK_FOREST_API_KEY", &config.bfl_api_key),
            ("ELEVEN_LABS_API_KEY", &config.eleven_labs_api_key),
        ] {
            if key.is_none() {
                tracing::warn!("{} is not set; requests to that provider will be unauthenticated", name);
            }
        }

        Self {
            idea_model: Arc::new(ChatCompletionClient::new(
                http.clone(),
                &config.nebius_base_url,
                config.nebius_api_key.clone(),
                &config.idea_model,
            )),
            chat_model: Arc::new(ChatCompletionClient::new(
                http.clone(),
                &config.openai_base_url,
                config.openai_api_key.clone(),
                &config.chat_model,
            )),
            images: Arc::new(FluxClient::new(
                http.clone(),
                &config.bfl_endpoint,
                config.bfl_api_key.clone(),
            )),
            speech: Arc::new(ElevenLabsClient::new(
                http,
                &config.eleven_labs_base_url,
                config.eleven_labs_api_key.clone(),
                &config.voice_id,
                &config.tts_model,
            )),
        }
    }

    /// Asks the idea model for a structured tree and parses its reply
    pub async fn generate_tree(&self, prompt: &str) -> Result<Vec<IdeaNode>, UpstreamError> {
        if prompt.trim().is_empty() {
            return Err(UpstreamError::InvalidRequest("Prompt is required".to_string()));
        }

        let messages = vec![
            ChatMessage::new(Role::System, prompts::TREE_SYSTEM_PROMPT),
            ChatMessage::new(Role::User, prompt),
        ];
        let reply = self
            .idea_model
            .complete(messages, prompts::tree_sampling())
            .await?
            .unwrap_or_default();

        parse_tree_reply(&reply).map_err(|e| {
            tracing::error!("Unparseable tree reply: {}", e);
            UpstreamError::Malformed(e.to_string())
        })
    }

    /// Returns the raw idea text, usually a numbered list
    pub async fn generate_idea(&self, request: &IdeaRequest) -> Result<String, UpstreamError> {
        let prompt = prompts::idea_prompt(&request.context, &request.current_node, request.depth);
        let text = self
            .idea_model
            .complete(
                vec![ChatMessage::new(Role::System, prompt)],
                prompts::idea_sampling(),
            )
            .await?;

        Ok(text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| prompts::EMPTY_IDEA_REPLY.to_string()))
    }

    pub async fn chat(&self, request: &ChatRequest, model: ChatModel) -> Result<String, UpstreamError> {
        let mut messages = vec![ChatMessage::new(
            Role::System,
            prompts::chat_system_prompt(&request.context),
        )];
        messages.extend(request.message_history.iter().map(|entry| {
            let role = if entry.sender == "user" {
                Role::User
            } else {
                Role::Assistant
            };
            ChatMessage::new(role, entry.text.clone())
        }));
        messages.push(ChatMessage::new(Role::User, request.message.clone()));

        let model = match model {
            ChatModel::Primary => &self.chat_model,
            ChatModel::Llama => &self.idea_model,
        };
        let reply = model.complete(messages, prompts::chat_sampling()).await?;

        Ok(reply
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| prompts::EMPTY_CHAT_REPLY.to_string()))
    }

    pub async fn generate_image(&self, request: &ImageRequest) -> Result<ImageJob, UpstreamError> {
        let subject = request.subject().ok_or_else(|| {
            UpstreamError::InvalidRequest("A non-empty prompt is required".to_string())
        })?;
        let poll_url = self.images.submit(subject).await?;
        tracing::info!(poll_url = %poll_url, "Submitted image job");

        Ok(ImageJob {
            request_id: poll_url,
        })
    }

    pub async fn poll_image(&self, poll_url: &str) -> Result<PollResponse, UpstreamError> {
        self.images.poll(poll_url).await
    }

    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, UpstreamError> {
        if text.trim().is_empty() {
            return Err(UpstreamError::InvalidRequest("Text is required".to_string()));
        }
        self.speech.synthesize(text).await
    }
}

/// Reads a non-2xx response into an [`UpstreamError::Status`]
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::models::HistoryEntry;

    #[tokio::test]
    async fn test_generate_tree_parses_fenced_reply() {
        let reply = "Here you go:\n```json\n[{\"name\":\"Venue\",\"children\":[{\"name\":\"Outdoor\"}]}]\n```";
        let services = services(
            ScriptedModel::replying(vec![Ok(Some(reply.to_string()))]),
            ScriptedModel::default(),
        );

        let tree = services.generate_tree("Plan a wedding").await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "Venue");
    }

    #[tokio::test]
    async fn test_generate_tree_rejects_garbage() {
        let services = services(
            ScriptedModel::replying(vec![Ok(Some("not json at all".to_string()))]),
            ScriptedModel::default(),
        );
        assert!(matches!(
            services.generate_tree("Plan a wedding").await,
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            services.generate_tree("   ").await,
            Err(UpstreamError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_idea_defaults_empty_reply() {
        let services = services(
            ScriptedModel::replying(vec![Ok(None)]),
            ScriptedModel::default(),
        );
        let request = IdeaRequest {
            context: "Plan a wedding > Venue".to_string(),
            current_node: "Venue".to_string(),
            depth: 1,
        };
        assert_eq!(
            services.generate_idea(&request).await.unwrap(),
            prompts::EMPTY_IDEA_REPLY
        );
    }

    #[tokio::test]
    async fn test_chat_maps_history_roles() {
        let chat_model = Arc::new(ScriptedModel::replying(vec![Ok(Some(
            "Sounds lovely! Indoors or out?".to_string(),
        ))]));
        let services = Services::new(
            Arc::new(ScriptedModel::default()),
            chat_model.clone(),
            Arc::new(FakeImages::ready_after(0)),
            Arc::new(FakeSpeech),
        );
        let request = ChatRequest {
            message: "A garden".to_string(),
            context: "Venue".to_string(),
            message_history: vec![
                HistoryEntry {
                    text: "Hi".to_string(),
                    sender: "ai".to_string(),
                },
                HistoryEntry {
                    text: "Hello".to_string(),
                    sender: "user".to_string(),
                },
            ],
        };

        let reply = services.chat(&request, ChatModel::Primary).await.unwrap();
        assert_eq!(reply, "Sounds lovely! Indoors or out?");

        let seen = chat_model.seen.lock().unwrap();
        let roles: Vec<Role> = seen[0].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Assistant, Role::User, Role::User]
        );
        assert!(seen[0][0].content.contains("Venue"));
        assert_eq!(seen[0][3].content, "A garden");
    }

    #[tokio::test]
    async fn test_generate_image_requires_subject() {
        let services = services(ScriptedModel::default(), ScriptedModel::default());
        assert!(matches!(
            services.generate_image(&ImageRequest::default()).await,
            Err(UpstreamError::InvalidRequest(_))
        ));

        let job = services
            .generate_image(&ImageRequest {
                response: Some("a garden wedding".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(job.request_id.starts_with("https://poll.test/"));
    }
}

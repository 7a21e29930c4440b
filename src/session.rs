//! Per-node conversations
//!
//! A [`Conversation`] holds the transcript and current illustration for one node.
//! Each user message runs a turn: chat reply, then speech, then an illustrative image,
//! strictly in that order. Failures degrade to a dropped reply or the placeholder image.

use serde::{Deserialize, Serialize};

use crate::api::client::{Client, ClientError};
use crate::models::{ChatRequest, HistoryEntry, ImageJob, ImageRequest, Message, TreeError};
use crate::prompts;
use crate::retry::{poll_until_ready, PollError, PollPolicy, PollStatus};

/// Image shown before the first illustration arrives, and after a failed one
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A reply is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Turn did not complete: {0}")]
    Interrupted(String),
}

/// Knobs for one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    /// Synthesize speech for the reply
    pub speak: bool,
    pub poll: PollPolicy,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            speak: true,
            poll: PollPolicy::IMAGE,
        }
    }
}

/// Transcript and illustration for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    topic: String,
    messages: Vec<Message>,
    image_url: String,
    busy: bool,
    #[serde(skip)]
    last_audio: Option<Vec<u8>>,
}

impl Conversation {
    /// Starts a conversation with a greeting about `topic`
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            messages: vec![Message::ai(prompts::greeting(&topic))],
            topic,
            image_url: PLACEHOLDER_IMAGE.to_string(),
            busy: false,
            last_audio: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Speech for the most recent reply, if any was synthesized
    pub fn last_audio(&self) -> Option<&[u8]> {
        self.last_audio.as_deref()
    }

    /// Records the user's message and a typing placeholder, and returns the chat request.
    ///
    /// The history sent upstream is the transcript before this message.
    pub fn begin_turn(&mut self, text: &str) -> Result<ChatRequest, SessionError> {
        if self.busy {
            return Err(SessionError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let request = ChatRequest {
            message: text.to_string(),
            context: self.topic.clone(),
            message_history: self
                .messages
                .iter()
                .filter(|m| !m.pending)
                .map(HistoryEntry::from)
                .collect(),
        };

        self.messages.push(Message::user(text));
        self.messages.push(Message::typing());
        self.busy = true;

        Ok(request)
    }

    /// Replaces the typing placeholder with the reply, or drops it when there is none
    pub fn apply_reply(&mut self, reply: Option<String>) {
        let Some(index) = self.messages.iter().rposition(|m| m.pending) else {
            return;
        };
        match reply {
            Some(text) => self.messages[index] = Message::ai(text),
            None => {
                self.messages.remove(index);
            }
        }
    }

    pub fn apply_audio(&mut self, audio: Option<Vec<u8>>) {
        if audio.is_some() {
            self.last_audio = audio;
        }
    }

    /// Shows the new image, or the placeholder when generation failed
    pub fn apply_image(&mut self, url: Option<String>) {
        self.image_url = url.unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());
    }

    pub fn end_turn(&mut self) {
        self.busy = false;
    }

    /// Image request illustrating `reply`
    pub fn image_request(&self, user_text: &str, reply: &str) -> ImageRequest {
        ImageRequest {
            prompt: None,
            message: Some(user_text.to_string()),
            response: Some(reply.to_string()),
            context: Some(self.topic.clone()),
        }
    }

    /// Runs one full turn: chat, then speech (if enabled), then image.
    ///
    /// Returns the reply, or `None` when the chat call failed.
    pub async fn send<C: Client + ?Sized>(
        &mut self,
        client: &C,
        text: &str,
        options: TurnOptions,
    ) -> Result<Option<String>, SessionError> {
        let request = self.begin_turn(text)?;

        let reply = request_reply(client, &request).await;
        self.apply_reply(reply.clone());

        if let Some(reply_text) = &reply {
            if options.speak {
                let audio = request_speech(client, reply_text).await;
                self.apply_audio(audio);
            }
            let image_request = self.image_request(&request.message, reply_text);
            let image = request_image(client, &image_request, options.poll).await;
            self.apply_image(image);
        }

        self.end_turn();
        Ok(reply)
    }
}

/// Chat step of a turn; failures are logged and yield `None`
pub async fn request_reply<C: Client + ?Sized>(client: &C, request: &ChatRequest) -> Option<String> {
    match client.chat(request).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            tracing::error!(topic = %request.context, "Chat request failed: {}", e);
            None
        }
    }
}

/// Speech step of a turn; failures are logged and yield `None`
pub async fn request_speech<C: Client + ?Sized>(client: &C, text: &str) -> Option<Vec<u8>> {
    match client.text_to_speech(text).await {
        Ok(audio) => Some(audio),
        Err(e) => {
            tracing::warn!("Speech synthesis failed: {}", e);
            None
        }
    }
}

/// Image step of a turn: submit, then poll until resolved. Failures are logged and
/// yield `None`.
pub async fn request_image<C: Client + ?Sized>(
    client: &C,
    request: &ImageRequest,
    policy: PollPolicy,
) -> Option<String> {
    let job = match client.generate_image(request).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!("Image submission failed: {}", e);
            return None;
        }
    };

    match resolve_image(client, &job, policy).await {
        Ok(url) => Some(url),
        Err(PollError::TimedOut { attempts }) => {
            tracing::warn!(attempts, poll_url = %job.request_id, "Image not ready in time");
            None
        }
        Err(PollError::Failed(reason)) => {
            tracing::error!(poll_url = %job.request_id, "Image generation failed: {}", reason);
            None
        }
    }
}

/// Polls `job` until it yields an image URL.
///
/// A 4xx answer fails the job at once; any other error on a single poll counts as a
/// pending attempt.
pub async fn resolve_image<C: Client + ?Sized>(
    client: &C,
    job: &ImageJob,
    policy: PollPolicy,
) -> Result<String, PollError> {
    poll_until_ready(policy, move |attempt| async move {
        match client.poll_image(job).await {
            Ok(response) => response.into_status(),
            Err(ClientError::Status { status, message }) if (400..500).contains(&status) => {
                PollStatus::Failed(format!("{}: {}", status, message))
            }
            Err(e) => {
                tracing::warn!(attempt, "Image poll failed: {}", e);
                PollStatus::Pending
            }
        }
    })
    .await
}

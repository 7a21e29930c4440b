//! Scripted [`Client`] used by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::api::client::{Client, ClientError};
use crate::models::{ChatRequest, IdeaNode, IdeaRequest, ImageJob, ImageRequest, PollResponse};

pub const DEFAULT_IDEAS: &str = "1. First idea\n2. Second idea\n3. Third idea";
pub const DEFAULT_SAMPLE: &str = "https://delivery.test/default.png";

/// Replays queued results per endpoint and records what it was asked
#[derive(Default)]
pub struct ScriptedClient {
    trees: Mutex<VecDeque<Result<Vec<IdeaNode>, String>>>,
    ideas: Mutex<VecDeque<Result<String, String>>>,
    chats: Mutex<VecDeque<Result<String, String>>>,
    polls: Mutex<VecDeque<PollResponse>>,
    speech_fails: bool,
    image_fails: bool,
    idea_gate: Option<Arc<Notify>>,
    chat_gate: Option<Arc<Notify>>,
    poll_rejection: Option<u16>,
    idea_log: Mutex<Vec<IdeaRequest>>,
    chat_log: Mutex<Vec<ChatRequest>>,
    image_log: Mutex<Vec<ImageRequest>>,
    tree_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    speech_calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn with_trees(self, trees: Vec<Result<Vec<IdeaNode>, String>>) -> Self {
        *self.trees.lock().unwrap() = trees.into();
        self
    }

    pub fn with_ideas(self, ideas: Vec<Result<String, String>>) -> Self {
        *self.ideas.lock().unwrap() = ideas.into();
        self
    }

    pub fn with_chats(self, chats: Vec<Result<String, String>>) -> Self {
        *self.chats.lock().unwrap() = chats.into();
        self
    }

    pub fn with_polls(self, polls: Vec<PollResponse>) -> Self {
        *self.polls.lock().unwrap() = polls.into();
        self
    }

    pub fn failing_speech(mut self) -> Self {
        self.speech_fails = true;
        self
    }

    pub fn failing_images(mut self) -> Self {
        self.image_fails = true;
        self
    }

    /// Holds every idea request until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.idea_gate = Some(gate);
        self
    }

    pub fn gated_chats(mut self, gate: Arc<Notify>) -> Self {
        self.chat_gate = Some(gate);
        self
    }

    /// Every poll answers with this HTTP status
    pub fn rejecting_polls(mut self, status: u16) -> Self {
        self.poll_rejection = Some(status);
        self
    }

    pub fn idea_requests(&self) -> Vec<IdeaRequest> {
        self.idea_log.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_log.lock().unwrap().clone()
    }

    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.image_log.lock().unwrap().clone()
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn speech_calls(&self) -> usize {
        self.speech_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Client for ScriptedClient {
    async fn generate_tree(&self, _prompt: &str) -> Result<Vec<IdeaNode>, ClientError> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.trees.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err("no tree scripted".to_string()))
            .map_err(ClientError::Api)
    }

    async fn generate_idea(&self, request: &IdeaRequest) -> Result<String, ClientError> {
        self.idea_log.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.idea_gate {
            gate.notified().await;
        }
        let next = self.ideas.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(DEFAULT_IDEAS.to_string()))
            .map_err(ClientError::Api)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        self.chat_log.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.chat_gate {
            gate.notified().await;
        }
        let next = self.chats.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err("no chat scripted".to_string()))
            .map_err(ClientError::Api)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageJob, ClientError> {
        self.image_log.lock().unwrap().push(request.clone());
        if self.image_fails {
            return Err(ClientError::Status {
                status: 500,
                message: "image provider down".to_string(),
            });
        }
        Ok(ImageJob {
            request_id: "https://poll.test/job".to_string(),
        })
    }

    async fn poll_image(&self, _job: &ImageJob) -> Result<PollResponse, ClientError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.poll_rejection {
            return Err(ClientError::Status {
                status,
                message: "poll rejected".to_string(),
            });
        }
        let next = self.polls.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| PollResponse::ready(DEFAULT_SAMPLE)))
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        if self.speech_fails {
            return Err(ClientError::MissingData);
        }
        Ok(text.as_bytes().to_vec())
    }
}

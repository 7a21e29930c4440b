//! Client trait definition
//!
//! This module defines the `Client` trait that abstracts over different client implementations.

use super::ClientError;
use crate::models::{ChatRequest, IdeaNode, IdeaRequest, ImageJob, ImageRequest, PollResponse};

/// Trait defining the proxy interface used by the tree controller and conversations
#[async_trait::async_trait]
pub trait Client: Send + Sync {
    /// Generate a full tree of ideas for a prompt
    async fn generate_tree(&self, prompt: &str) -> Result<Vec<IdeaNode>, ClientError>;

    /// Generate child ideas for a node; the reply is usually a numbered list
    async fn generate_idea(&self, request: &IdeaRequest) -> Result<String, ClientError>;

    /// Get a conversational reply
    async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError>;

    /// Submit an image job
    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageJob, ClientError>;

    /// Poll a submitted image job once
    async fn poll_image(&self, job: &ImageJob) -> Result<PollResponse, ClientError>;

    /// Synthesize speech; returns audio/mpeg bytes
    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ClientError>;
}

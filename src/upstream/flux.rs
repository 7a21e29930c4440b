//! Black Forest Labs FLUX image client
//!
//! Submitting returns a polling URL; polling that URL reports `Pending` until the
//! result sample URL is available.

use serde::{Deserialize, Serialize};

use super::{check_status, ImageService, UpstreamError};
use crate::models::PollResponse;

const IMAGE_WIDTH: u32 = 1024;
const IMAGE_HEIGHT: u32 = 768;

#[derive(Debug, Clone)]
pub struct FluxClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl FluxClient {
    pub fn new(http: reqwest::Client, endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-key", key),
            None => request,
        }
    }
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct SubmitReply {
    polling_url: Option<String>,
}

#[async_trait::async_trait]
impl ImageService for FluxClient {
    async fn submit(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = SubmitBody {
            prompt,
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
        };
        let request = self
            .authorize(self.http.post(&self.endpoint))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);

        let response = check_status(request.send().await?).await?;
        let reply: SubmitReply = response.json().await?;
        reply
            .polling_url
            .ok_or_else(|| UpstreamError::Malformed("missing polling_url".to_string()))
    }

    async fn poll(&self, poll_url: &str) -> Result<PollResponse, UpstreamError> {
        let request = self
            .authorize(self.http.get(poll_url))
            .header(reqwest::header::ACCEPT, "application/json");
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

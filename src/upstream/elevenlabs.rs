//! ElevenLabs streaming text-to-speech client

use serde::Serialize;

use super::{check_status, SpeechService, UpstreamError};

#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        voice_id: &str,
        model_id: &str,
    ) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/text-to-speech/{}/stream",
                base_url.trim_end_matches('/'),
                voice_id
            ),
            api_key,
            model_id: model_id.to_string(),
        }
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[async_trait::async_trait]
impl SpeechService for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, UpstreamError> {
        let body = SpeechBody {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .header("xi-api-key", self.api_key.as_deref().unwrap_or_default())
            .json(&body);

        tracing::debug!(chars = text.len(), "Synthesizing speech");
        let response = check_status(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

//! Service configuration
//!
//! Credentials and endpoints for the upstream providers. Values come from flags or
//! the environment and are read once at startup.

use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct ServiceConfig {
    /// API key for the Nebius-hosted idea model
    #[arg(long, env = "NEBIUS_API_KEY", hide_env_values = true)]
    pub nebius_api_key: Option<String>,

    #[arg(
        long,
        env = "NEBIUS_BASE_URL",
        default_value = "https://api.studio.nebius.ai/v1/"
    )]
    pub nebius_base_url: String,

    /// Model used for tree and idea generation, and for the llama chat route
    #[arg(
        long,
        env = "IDEA_MODEL",
        default_value = "meta-llama/Llama-3.3-70B-Instruct"
    )]
    pub idea_model: String,

    /// API key for the conversation model
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1/")]
    pub openai_base_url: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    pub chat_model: String,

    /// API key for the FLUX image service
    #[arg(long, env = "BLACK_FOREST_API_KEY", hide_env_values = true)]
    pub bfl_api_key: Option<String>,

    #[arg(
        long,
        env = "BFL_ENDPOINT",
        default_value = "https://api.us1.bfl.ai/v1/flux-pro-1.1"
    )]
    pub bfl_endpoint: String,

    /// API key for the ElevenLabs speech service
    #[arg(long, env = "ELEVEN_LABS_API_KEY", hide_env_values = true)]
    pub eleven_labs_api_key: Option<String>,

    #[arg(
        long,
        env = "ELEVEN_LABS_BASE_URL",
        default_value = "https://api.elevenlabs.io/v1"
    )]
    pub eleven_labs_base_url: String,

    #[arg(long, env = "VOICE_ID", default_value = "m7dvBJNSAB0scDjhPYgk")]
    pub voice_id: String,

    #[arg(long, env = "TTS_MODEL", default_value = "eleven_multilingual_v2")]
    pub tts_model: String,
}

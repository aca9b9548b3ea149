use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use songbird::input::Input;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, error};

/// Proveedor de síntesis de voz configurado por guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Google,
    Ibm,
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtsProvider::Google => f.write_str("google"),
            TtsProvider::Ibm => f.write_str("ibm"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("speech API answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("speech API returned no audio")]
    Empty,
}

/// Convierte texto en audio reproducible
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, provider: TtsProvider, voice: &str) -> Result<Input, SpeechError>;
}

/// Cliente del endpoint `/speech` de la API del bot
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, provider: TtsProvider, voice: &str) -> Result<Input, SpeechError> {
        debug!("🗣️ Sintetizando con {} ({}): {}", provider, voice, text);

        let provider = provider.to_string();
        let response = self
            .client
            .get(format!("{}/speech", self.base_url))
            .query(&[
                ("token", self.token.as_str()),
                ("type", provider.as_str()),
                ("lang", voice),
                ("text", text),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("❌ Speech API error: {} - {}", status, body);
            return Err(SpeechError::Api { status, body });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::Empty);
        }

        Ok(Input::from(audio.to_vec()))
    }
}

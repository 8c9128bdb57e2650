use crate::config::Config;
use crate::error::SynthesisError;
use crate::logw;
use crate::media::{MediaAsset, MediaKind};
use crate::synth::{Narrator, write_asset};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

const SERVICE: &str = "elevenlabs";
pub const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";

pub struct ElevenLabsNarrator {
    client: Client,
    api_key: String,
    model_id: String,
    base_url: String,
}

impl ElevenLabsNarrator {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.elevenlabs_key.clone(),
            model_id: cfg.eleven_model_id.clone(),
            base_url: ELEVENLABS_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn speech_url(&self, voice_id: &str) -> String {
        format!(
            "{}/text-to-speech/{}?output_format=mp3_44100_128",
            self.base_url, voice_id
        )
    }
}

#[async_trait]
impl Narrator for ElevenLabsNarrator {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("narration is empty".to_string()));
        }
        if voice_id.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("voice id is empty".to_string()));
        }

        let body = serde_json::json!({
            "text": text.trim(),
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(self.speech_url(voice_id))
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = raw.chars().take(800).collect::<String>();
            logw(format!("ElevenLabs TTS failed HTTP {}", status.as_u16()));
            return Err(SynthesisError::Rejected {
                service: SERVICE,
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        write_asset(SERVICE, MediaKind::Audio, dest, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrator() -> ElevenLabsNarrator {
        let cfg: Config = serde_json::from_str(r#"{"elevenlabs_api_key": "xi-test"}"#).unwrap();
        ElevenLabsNarrator::new(Client::new(), &cfg)
    }

    #[test]
    fn voice_goes_into_url() {
        let n = narrator().with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            n.speech_url("JBFqnCBsd6RMkjVDRZzb"),
            "http://localhost:8080/v1/text-to-speech/JBFqnCBsd6RMkjVDRZzb?output_format=mp3_44100_128"
        );
    }

    #[tokio::test]
    async fn blank_voice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = narrator()
            .synthesize("Hello", " ", &dir.path().join("a.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidInput(_)));
    }
}

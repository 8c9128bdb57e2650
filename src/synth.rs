use crate::api::elevenlabs::ElevenLabsNarrator;
use crate::api::openai::OpenAiClient;
use crate::config::Config;
use crate::error::SynthesisError;
use crate::media::{FrameSize, MediaAsset, MediaKind};
use crate::story::StoryDocument;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// Text-to-speech capability.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Voices `text` and writes the audio to `dest`.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError>;
}

/// Text-to-image capability.
#[async_trait]
pub trait Illustrator: Send + Sync {
    /// Illustrates `description` at the backend size class nearest to `target`
    /// and writes the image to `dest`. The image need not match `target` exactly.
    async fn render(
        &self,
        description: &str,
        target: FrameSize,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError>;
}

/// Language model that writes a scene-by-scene story about a subject.
#[async_trait]
pub trait StoryWriter: Send + Sync {
    async fn write_story(
        &self,
        subject: &str,
        scene_count: u32,
    ) -> Result<StoryDocument, SynthesisError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NarratorBackend {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "elevenlabs", alias = "eleven_labs")]
    ElevenLabs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IllustratorBackend {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
}

/// Authenticated clients for one run, shared across scenes.
#[derive(Clone)]
pub struct Clients {
    pub narrator: Arc<dyn Narrator>,
    pub illustrator: Arc<dyn Illustrator>,
    pub writer: Arc<dyn StoryWriter>,
}

pub fn build_clients(cfg: &Config) -> Result<Clients> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let openai = Arc::new(OpenAiClient::new(http.clone(), cfg));

    let narrator: Arc<dyn Narrator> = match cfg.narrator {
        NarratorBackend::OpenAi => openai.clone(),
        NarratorBackend::ElevenLabs => Arc::new(ElevenLabsNarrator::new(http, cfg)),
    };
    let illustrator: Arc<dyn Illustrator> = match cfg.illustrator {
        IllustratorBackend::OpenAi => openai.clone(),
    };

    Ok(Clients {
        narrator,
        illustrator,
        writer: openai,
    })
}

/// Writes a downloaded asset to `dest`, creating its directory first.
pub(crate) async fn write_asset(
    service: &'static str,
    kind: MediaKind,
    dest: &Path,
    bytes: &[u8],
) -> Result<MediaAsset, SynthesisError> {
    if bytes.is_empty() {
        return Err(SynthesisError::MalformedResponse {
            service,
            message: "empty media body".to_string(),
        });
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(dest, bytes).await?;
    Ok(MediaAsset::new(kind, dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_asset_rejects_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.mp3");
        let err = write_asset("openai", MediaKind::Audio, &dest, b"").await.unwrap_err();
        assert!(matches!(err, SynthesisError::MalformedResponse { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn write_asset_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/a.png");
        let asset = write_asset("openai", MediaKind::Image, &dest, b"png").await.unwrap();
        assert_eq!(asset.kind(), MediaKind::Image);
        assert_eq!(std::fs::read(asset.path()).unwrap(), b"png");
    }

    #[test]
    fn backend_names() {
        let n: NarratorBackend = serde_json::from_str("\"eleven_labs\"").unwrap();
        assert_eq!(n, NarratorBackend::ElevenLabs);
        let n: NarratorBackend = serde_json::from_str("\"elevenlabs\"").unwrap();
        assert_eq!(n, NarratorBackend::ElevenLabs);
        let i: IllustratorBackend = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(i, IllustratorBackend::OpenAi);
        assert_eq!(
            serde_json::to_string(&NarratorBackend::OpenAi).unwrap(),
            "\"openai\""
        );
    }

    #[test]
    fn factory_selects_narrator_backend() {
        let cfg: Config = serde_json::from_str(
            r#"{"openai_api_key": "sk-test", "elevenlabs_api_key": "xi", "narrator": "elevenlabs"}"#,
        )
        .unwrap();
        let clients = build_clients(&cfg).unwrap();
        assert_eq!(Arc::strong_count(&clients.writer), 2);
    }
}

use crate::generator::{FailurePolicy, RetryPolicy};
use crate::media::FrameSize;
use crate::synth::{IllustratorBackend, NarratorBackend};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "openai_api_key", default, skip_serializing)]
    pub openai_key: String,
    #[serde(rename = "elevenlabs_api_key", default, skip_serializing)]
    pub elevenlabs_key: String,
    #[serde(default)]
    pub narrator: NarratorBackend,
    #[serde(default)]
    pub illustrator: IllustratorBackend,
    /// Voice for narration; each backend has its own default.
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_story_model")]
    pub story_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_image_quality")]
    pub image_quality: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_scene_count")]
    pub scene_count: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_story_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    1792
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("output/work")
}

fn default_scene_count() -> u32 {
    5
}

fn default_concurrency() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            elevenlabs_key: String::new(),
            narrator: NarratorBackend::default(),
            illustrator: IllustratorBackend::default(),
            voice: None,
            story_model: default_story_model(),
            tts_model: default_tts_model(),
            image_model: default_image_model(),
            image_quality: default_image_quality(),
            eleven_model_id: default_model_id(),
            width: default_width(),
            height: default_height(),
            output_dir: default_output_dir(),
            work_dir: default_work_dir(),
            scene_count: default_scene_count(),
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Reads `path` when it exists, otherwise starts from defaults. Empty API
    /// keys are then taken from `OPENAI_API_KEY` / `ELEVENLABS_API_KEY`.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config: {}", path.display()));
            }
        };

        config.fill_keys_from(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn fill_keys_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.openai_key.is_empty() {
            self.openai_key = lookup("OPENAI_API_KEY").unwrap_or_default();
        }
        if self.elevenlabs_key.is_empty() {
            self.elevenlabs_key = lookup("ELEVENLABS_API_KEY").unwrap_or_default();
        }
    }

    /// Checks that the selected backends have credentials and the frame is usable.
    pub fn validate(&self) -> Result<()> {
        let needs_openai = self.narrator == NarratorBackend::OpenAi
            || self.illustrator == IllustratorBackend::OpenAi;
        if needs_openai && self.openai_key.is_empty() {
            anyhow::bail!("config.json: openai_api_key missing (or set OPENAI_API_KEY)");
        }
        if self.narrator == NarratorBackend::ElevenLabs && self.elevenlabs_key.is_empty() {
            anyhow::bail!("config.json: elevenlabs_api_key missing (or set ELEVENLABS_API_KEY)");
        }
        if self.frame().is_empty() {
            anyhow::bail!("config.json: width/height must be at least 2 pixels");
        }
        Ok(())
    }

    pub fn voice_id(&self) -> String {
        if let Some(voice) = self.voice.as_ref().filter(|v| !v.trim().is_empty()) {
            return voice.clone();
        }
        match self.narrator {
            NarratorBackend::OpenAi => "alloy".to_string(),
            NarratorBackend::ElevenLabs => "JBFqnCBsd6RMkjVDRZzb".to_string(),
        }
    }

    pub fn frame(&self) -> FrameSize {
        FrameSize::new(self.width, self.height).even()
    }
}

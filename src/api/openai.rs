use crate::config::Config;
use crate::error::SynthesisError;
use crate::media::{FrameSize, MediaAsset, MediaKind, SizeClass};
use crate::prompt;
use crate::story::StoryDocument;
use crate::synth::{Illustrator, Narrator, StoryWriter, write_asset};
use crate::{logi, logw};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

const SERVICE: &str = "openai";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const MAX_TTS_CHARS: usize = 4096;

/// One authenticated OpenAI client serving speech, image and story requests.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    story_model: String,
    tts_model: String,
    image_model: String,
    image_quality: String,
}

impl OpenAiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.openai_key.clone(),
            base_url: OPENAI_API_BASE.to_string(),
            story_model: cfg.story_model.clone(),
            tts_model: cfg.tts_model.clone(),
            image_model: cfg.image_model.clone(),
            image_quality: cfg.image_quality.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post_json(&self, path: &str, body: &Value, timeout_s: u64) -> Result<String, SynthesisError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .timeout(Duration::from_secs(timeout_s))
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(rejected(status.as_u16(), &raw));
        }
        Ok(raw)
    }
}

fn rejected(status: u16, raw: &str) -> SynthesisError {
    let message = openai_error_message(raw).unwrap_or_else(|| raw.chars().take(800).collect());
    logw(format!("OpenAI HTTP {}: {}", status, message));
    SynthesisError::Rejected {
        service: SERVICE,
        status,
        message,
    }
}

fn malformed(message: impl Into<String>) -> SynthesisError {
    SynthesisError::MalformedResponse {
        service: SERVICE,
        message: message.into(),
    }
}

fn openai_error_message(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;
    let err = root.get("error")?;
    let msg = err.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error");
    match err.get("code").and_then(|v| v.as_str()) {
        Some(code) => Some(format!("{} ({})", msg, code)),
        None => Some(msg.to_string()),
    }
}

fn openai_extract_chat_text(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;
    root.get("choices")?
        .as_array()?
        .iter()
        .find_map(|choice| choice.get("message")?.get("content")?.as_str())
        .map(str::to_string)
}

fn openai_extract_image_url(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;
    root.get("data")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

fn api_size(class: SizeClass) -> String {
    class.dimensions().to_string()
}

#[async_trait]
impl Narrator for OpenAiClient {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::InvalidInput("narration is empty".to_string()));
        }
        if text.chars().count() > MAX_TTS_CHARS {
            return Err(SynthesisError::InvalidInput(format!(
                "narration exceeds {} characters",
                MAX_TTS_CHARS
            )));
        }

        let body = json!({
            "model": self.tts_model,
            "voice": voice_id,
            "input": text,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(rejected(status.as_u16(), &raw));
        }

        let bytes = resp.bytes().await?;
        write_asset(SERVICE, MediaKind::Audio, dest, &bytes).await
    }
}

#[async_trait]
impl Illustrator for OpenAiClient {
    async fn render(
        &self,
        description: &str,
        target: FrameSize,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        if description.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("image description is empty".to_string()));
        }

        let class = SizeClass::nearest(target);
        let body = json!({
            "model": self.image_model,
            "prompt": prompt::illustration_prompt(description),
            "size": api_size(class),
            "quality": self.image_quality,
            "n": 1,
        });

        let raw = self.post_json("/images/generations", &body, 300).await?;
        let url = openai_extract_image_url(&raw).ok_or_else(|| malformed("no image url in response"))?;

        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SynthesisError::Rejected {
                service: SERVICE,
                status: status.as_u16(),
                message: "image download failed".to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        write_asset(SERVICE, MediaKind::Image, dest, &bytes).await
    }
}

#[async_trait]
impl StoryWriter for OpenAiClient {
    async fn write_story(
        &self,
        subject: &str,
        scene_count: u32,
    ) -> Result<StoryDocument, SynthesisError> {
        if subject.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("subject is empty".to_string()));
        }
        if scene_count == 0 {
            return Err(SynthesisError::InvalidInput("scene count must be positive".to_string()));
        }

        let body = json!({
            "model": self.story_model,
            "messages": [
                {"role": "system", "content": prompt::story_system_prompt()},
                {"role": "user", "content": prompt::story_user_prompt(subject, scene_count)},
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
            "response_format": {"type": "json_object"},
        });

        logi(format!("Requesting OpenAI story ({} scenes about {})...", scene_count, subject));
        let raw = self.post_json("/chat/completions", &body, 600).await?;
        let text = openai_extract_chat_text(&raw).ok_or_else(|| malformed("no message content"))?;
        let story = StoryDocument::from_json(&text).map_err(|e| malformed(e.to_string()))?;
        logi(format!("OpenAI story received: {} ({} scenes)", story.title, story.scenes.len()));
        Ok(story)
    }
}

use crate::error::SchemaError;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// One narrated unit of a story.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub scene_number: u32,
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub image_prompt: String,
    /// Advisory only; rendered length comes from the narration audio.
    #[serde(rename = "duration", default)]
    pub duration_hint: f64,
    #[serde(rename = "background_music", default)]
    pub background_music_tag: String,
}

impl Scene {
    /// Number used in messages and file names; falls back to the position in the story.
    pub fn display_number(&self, index: usize) -> u32 {
        if self.scene_number > 0 {
            self.scene_number
        } else {
            index as u32 + 1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryDocument {
    #[serde(rename = "story_title", default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(rename = "total_duration", default)]
    pub total_duration: f64,
}

impl StoryDocument {
    /// Decodes a story, tolerating a surrounding Markdown code fence, and validates it.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let body = match CODE_FENCE.captures(text) {
            Some(caps) => caps.get(1).map_or(text, |m| m.as_str()),
            None => text,
        };
        let story: StoryDocument =
            serde_json::from_str(body).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        story.validate()?;
        Ok(story)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.safe_title().is_empty() {
            return Err(SchemaError::MissingTitle);
        }
        if self.scenes.is_empty() {
            return Err(SchemaError::NoScenes);
        }
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene.narration.trim().is_empty() {
                return Err(SchemaError::MissingNarration { index });
            }
            if scene.image_prompt.trim().is_empty() {
                return Err(SchemaError::MissingImagePrompt { index });
            }
        }
        Ok(())
    }

    /// Title reduced to alphanumerics, `-` and `_`, with spaces turned into `_`.
    pub fn safe_title(&self) -> String {
        let kept: String = self
            .title
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .collect();
        kept.trim().replace(' ', "_")
    }

    pub fn default_output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.mp4", self.safe_title()))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read story: {}", path.display()))?;
        let story = Self::from_json(&content)
            .with_context(|| format!("Invalid story file: {}", path.display()))?;
        Ok(story)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write story: {}", path.display()))?;
        Ok(())
    }
}

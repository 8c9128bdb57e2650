#![allow(dead_code)]

use animal_story_video::{
    CancelToken, EncodingError, FrameSize, Illustrator, MediaAsset, MediaEncoder, MediaKind,
    Narrator, ProgressSink, RunPhase, Scene, StoryDocument, SynthesisError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub fn scene(number: u32, narration: &str, image_prompt: &str) -> Scene {
    Scene {
        scene_number: number,
        narration: narration.to_string(),
        image_prompt: image_prompt.to_string(),
        duration_hint: 5.0,
        background_music_tag: String::new(),
    }
}

/// A story whose scene `i` has image prompt `img-{i}` and narration `voice-{i}`.
pub fn story(title: &str, scenes: usize) -> StoryDocument {
    StoryDocument {
        title: title.to_string(),
        scenes: (0..scenes)
            .map(|i| scene(i as u32 + 1, &format!("voice-{i}"), &format!("img-{i}")))
            .collect(),
        total_duration: 5.0 * scenes as f64,
    }
}

/// Duration the stub narrator encodes for `text`.
pub fn narration_seconds(text: &str) -> f64 {
    text.len() as f64 / 10.0
}

#[derive(Default)]
pub struct StubIllustrator {
    pub calls: Mutex<Vec<String>>,
    pub failing: HashSet<String>,
    /// Description -> number of leading attempts that fail with a retryable error.
    pub flaky: Mutex<HashMap<String, u32>>,
    pub delays: HashMap<String, Duration>,
}

impl StubIllustrator {
    pub fn failing(descriptions: &[&str]) -> Self {
        Self {
            failing: descriptions.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Illustrator for StubIllustrator {
    async fn render(
        &self,
        description: &str,
        _target: FrameSize,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        self.calls.lock().unwrap().push(description.to_string());
        if let Some(delay) = self.delays.get(description) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(description) {
            return Err(SynthesisError::Transport(format!("no image for {description}")));
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(description).filter(|n| **n > 0) {
                *left -= 1;
                return Err(SynthesisError::Transport("connection reset".into()));
            }
        }
        std::fs::write(dest, description.as_bytes())?;
        Ok(MediaAsset::new(MediaKind::Image, dest))
    }
}

#[derive(Default)]
pub struct StubNarrator {
    pub calls: Mutex<Vec<String>>,
    pub rejected: HashSet<String>,
    pub delay: Option<Duration>,
}

impl StubNarrator {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Narrator for StubNarrator {
    async fn synthesize(
        &self,
        text: &str,
        _voice_id: &str,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejected.contains(text) {
            return Err(SynthesisError::Rejected {
                service: "stub",
                status: 401,
                message: "invalid key".into(),
            });
        }
        let body = serde_json::json!({ "duration": narration_seconds(text) });
        std::fs::write(dest, body.to_string())?;
        Ok(MediaAsset::new(MediaKind::Audio, dest))
    }
}

/// What the fake encoder writes for each segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeSegment {
    pub label: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Encoder writing JSON descriptions instead of real media.
#[derive(Default)]
pub struct FakeEncoder {
    /// Frame written regardless of the requested one.
    pub frame_override: Option<FrameSize>,
    pub fail_concat: AtomicBool,
    pub fail_blank: AtomicBool,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, EncodingError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| EncodingError::Probe {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn probe_duration(&self, media: &Path) -> Result<f64, EncodingError> {
        let value: serde_json::Value = read_json(media)?;
        value["duration"].as_f64().ok_or_else(|| EncodingError::Probe {
            path: media.to_path_buf(),
            message: "no duration".into(),
        })
    }

    async fn probe_frame(&self, video: &Path) -> Result<FrameSize, EncodingError> {
        let seg: FakeSegment = read_json(video)?;
        Ok(FrameSize::new(seg.width, seg.height))
    }

    async fn still_segment(
        &self,
        image: &Path,
        _audio: &Path,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError> {
        let frame = self.frame_override.unwrap_or(frame);
        let seg = FakeSegment {
            label: std::fs::read_to_string(image)?,
            duration,
            width: frame.width,
            height: frame.height,
        };
        std::fs::write(out, serde_json::to_vec(&seg).map_err(|e| EncodingError::Encoder(e.to_string()))?)?;
        Ok(())
    }

    async fn blank_segment(
        &self,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError> {
        if self.fail_blank.load(Ordering::SeqCst) {
            return Err(EncodingError::Encoder("lavfi unavailable".into()));
        }
        let seg = FakeSegment {
            label: "blank".into(),
            duration,
            width: frame.width,
            height: frame.height,
        };
        std::fs::write(out, serde_json::to_vec(&seg).map_err(|e| EncodingError::Encoder(e.to_string()))?)?;
        Ok(())
    }

    async fn concat(&self, segments: &[&Path], out: &Path) -> Result<(), EncodingError> {
        if self.fail_concat.load(Ordering::SeqCst) {
            std::fs::write(out, b"half a video")?;
            return Err(EncodingError::Encoder("muxer exploded".into()));
        }
        let mut all = Vec::with_capacity(segments.len());
        for path in segments {
            all.push(read_json::<FakeSegment>(path)?);
        }
        std::fs::write(out, serde_json::to_vec(&all).map_err(|e| EncodingError::Encoder(e.to_string()))?)?;
        Ok(())
    }
}

pub fn read_video(path: &Path) -> Vec<FakeSegment> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<u8>>,
    pub statuses: Mutex<Vec<String>>,
    pub phases: Mutex<Vec<RunPhase>>,
    /// Phases and statuses interleaved in the order they were reported.
    pub events: Mutex<Vec<String>>,
    /// Cancels the token when a status containing the text is reported.
    pub cancel_on: Option<(String, CancelToken)>,
}

impl RecordingSink {
    pub fn cancelling_on(text: &str, token: CancelToken) -> Self {
        Self {
            cancel_on: Some((text.to_string(), token)),
            ..Self::default()
        }
    }

    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<RunPhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
        self.events.lock().unwrap().push(format!("status: {message}"));
        if let Some((text, token)) = &self.cancel_on {
            if message.contains(text.as_str()) {
                token.cancel();
            }
        }
    }

    fn on_phase(&self, phase: RunPhase) {
        self.phases.lock().unwrap().push(phase);
        self.events.lock().unwrap().push(format!("phase: {phase}"));
    }
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

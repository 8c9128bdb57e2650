use crate::concat::{Concatenator, FinalVideo};
use crate::config::Config;
use crate::error::{PipelineError, SceneFailure, SceneRenderError};
use crate::ffmpeg::FfmpegEncoder;
use crate::init::dir_exists;
use crate::media::{FrameSize, MediaEncoder, RenderedSegment};
use crate::progress::{CancelToken, ProgressSink, ProgressTracker, RunPhase};
use crate::renderer::SceneRenderer;
use crate::story::StoryDocument;
use crate::synth::{self, Illustrator, Narrator};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use walkdir::WalkDir;

/// Share of the progress bar spent on rendering scenes; the rest is concatenation.
const RENDER_PROGRESS_SHARE: usize = 95;

/// Per-run scratch directories under the work root start with this.
pub(crate) const RUN_DIR_PREFIX: &str = "run-";

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// What to do when a scene fails to render.
///
/// With `Skip` the failed scene is simply left out of the video, so the
/// narrative may have a gap; callers should surface the reported failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Skip,
    Abort,
    Placeholder,
}

/// Bounded retries for synthesis calls. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Jittered exponential delays between attempts; one fewer than `max_attempts`.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(2)
            .factor(self.base_delay_ms)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub voice_id: String,
    pub target: FrameSize,
    pub output_path: PathBuf,
    pub failure_policy: FailurePolicy,
    /// Scenes rendered at once; results are still consumed in document order.
    pub concurrency: usize,
}

impl RunOptions {
    pub fn new(voice_id: impl Into<String>, target: FrameSize, output_path: impl Into<PathBuf>) -> Self {
        Self {
            voice_id: voice_id.into(),
            target,
            output_path: output_path.into(),
            failure_policy: FailurePolicy::default(),
            concurrency: 1,
        }
    }

    pub fn from_config(cfg: &Config, output_path: impl Into<PathBuf>) -> Self {
        Self {
            voice_id: cfg.voice_id(),
            target: cfg.frame(),
            output_path: output_path.into(),
            failure_policy: cfg.failure_policy,
            concurrency: cfg.concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFailureRecord {
    pub scene_index: usize,
    pub scene_number: u32,
    pub message: String,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub video: FinalVideo,
    pub failures: Vec<SceneFailureRecord>,
}

/// Structured result handed back to callers, whether or not the run succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub scene_count_rendered: usize,
    pub scene_count_failed: usize,
    pub failures: Vec<SceneFailureRecord>,
    pub total_duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// `failures` are the scene failures recorded before the run ended.
    pub fn from_run(
        result: &Result<RunOutcome, PipelineError>,
        failures: &[SceneFailureRecord],
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                output_path: Some(outcome.video.path.clone()),
                scene_count_rendered: outcome.video.scene_count,
                scene_count_failed: outcome.failures.len(),
                failures: outcome.failures.clone(),
                total_duration_seconds: outcome.video.duration_seconds,
                error: None,
            },
            Err(err) => Self {
                success: false,
                output_path: None,
                scene_count_rendered: 0,
                scene_count_failed: failures.len(),
                failures: failures.to_vec(),
                total_duration_seconds: 0.0,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Sequences per-scene rendering and final assembly for one story.
pub struct StoryVideoGenerator {
    renderer: SceneRenderer,
    concatenator: Concatenator,
    work_root: PathBuf,
}

impl StoryVideoGenerator {
    pub fn new(
        narrator: Arc<dyn Narrator>,
        illustrator: Arc<dyn Illustrator>,
        encoder: Arc<dyn MediaEncoder>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer: SceneRenderer::new(narrator, illustrator, encoder.clone()),
            concatenator: Concatenator::new(encoder),
            work_root: work_root.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.renderer = self.renderer.with_retry(retry);
        self
    }

    pub async fn run(
        &self,
        story: &StoryDocument,
        options: &RunOptions,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.execute(story, options, sink, cancel).await.0
    }

    /// Like [`run`](Self::run), but also returns every scene failure recorded,
    /// including those seen before a run-fatal error.
    pub async fn execute(
        &self,
        story: &StoryDocument,
        options: &RunOptions,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> (Result<RunOutcome, PipelineError>, Vec<SceneFailureRecord>) {
        let mut tracker = ProgressTracker::new(sink);
        tracker.phase(RunPhase::Pending);

        let mut failures = Vec::new();
        let result = self
            .run_phases(story, options, &mut tracker, cancel, &mut failures)
            .await;
        match &result {
            Ok(outcome) => {
                tracker.progress(100);
                tracker.phase(RunPhase::Done);
                let msg = format!(
                    "Video created: {} ({} scenes, {:.1} seconds)",
                    outcome.video.path.display(),
                    outcome.video.scene_count,
                    outcome.video.duration_seconds
                );
                logok(&msg);
                tracker.status(msg);
            }
            Err(err) => {
                tracker.phase(RunPhase::Failed);
                logw(format!("Run failed: {}", err));
                tracker.status(format!("Video could not be created: {}", err));
            }
        }
        (result, failures)
    }

    async fn run_phases(
        &self,
        story: &StoryDocument,
        options: &RunOptions,
        tracker: &mut ProgressTracker<'_>,
        cancel: &CancelToken,
        failures: &mut Vec<SceneFailureRecord>,
    ) -> Result<RunOutcome, PipelineError> {
        tracker.phase(RunPhase::Validating);
        story.validate()?;
        let target = options.target.even();
        if target.is_empty() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unusable frame size {}", options.target),
            )));
        }

        let total = story.scenes.len();
        logi(format!("Creating story: {} ({} scenes)", story.title, total));
        tracker.status(format!("Story validated: {} ({} scenes)", story.title, total));
        tracker.progress(0);

        fs::create_dir_all(&self.work_root).await?;
        let run_dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(&self.work_root)?;

        let mut segments: Vec<RenderedSegment> = Vec::with_capacity(total);

        let renderer = &self.renderer;
        let run_path = run_dir.path();
        let mut rendered = futures::stream::iter(story.scenes.iter().enumerate())
            .map(|(index, scene)| async move {
                let result = renderer
                    .render(index, scene, &options.voice_id, target, run_path, cancel)
                    .await;
                (index, result)
            })
            .buffered(options.concurrency.max(1));

        for awaiting in 0..total {
            // Marks the scene whose result is awaited next; with concurrency 1
            // this is the scene being rendered.
            tracker.phase(RunPhase::RenderingScenes(awaiting));
            let Some((index, result)) = rendered.next().await else {
                break;
            };
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let scene = &story.scenes[index];
            let number = scene.display_number(index);

            match result {
                Ok(segment) => {
                    let msg = format!(
                        "Scene {}/{} created ({:.1} seconds)",
                        index + 1,
                        total,
                        segment.duration_seconds
                    );
                    logok(&msg);
                    tracker.status(msg);
                    segments.push(segment);
                }
                Err(SceneRenderError {
                    cause: SceneFailure::Cancelled,
                    ..
                }) => return Err(PipelineError::Cancelled),
                Err(err) => {
                    let msg = format!("Scene {}/{} could not be created: {}", index + 1, total, err.cause);
                    logw(&msg);
                    tracker.status(msg);
                    failures.push(SceneFailureRecord {
                        scene_index: index,
                        scene_number: number,
                        message: err.cause.to_string(),
                    });

                    match options.failure_policy {
                        FailurePolicy::Skip => {}
                        FailurePolicy::Abort => return Err(PipelineError::SceneAborted(err)),
                        FailurePolicy::Placeholder => {
                            match renderer.placeholder(index, scene, target, run_path, cancel).await {
                                Ok(segment) => segments.push(segment),
                                Err(SceneRenderError {
                                    cause: SceneFailure::Cancelled,
                                    ..
                                }) => return Err(PipelineError::Cancelled),
                                Err(e) => {
                                    let msg = format!(
                                        "Placeholder for scene {}/{} could not be created: {}",
                                        index + 1,
                                        total,
                                        e.cause
                                    );
                                    logw(&msg);
                                    tracker.status(msg);
                                }
                            }
                        }
                    }
                }
            }

            tracker.progress(((index + 1) * RENDER_PROGRESS_SHARE / total) as u8);
        }
        drop(rendered);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if segments.iter().all(|s| s.placeholder) {
            logw("No scene could be rendered!");
            return Err(PipelineError::NoSegmentsProduced {
                failures: failures.clone(),
            });
        }

        tracker.phase(RunPhase::Concatenating);
        let real = segments.iter().filter(|s| !s.placeholder).count();
        tracker.status(format!("{} scenes created. Combining video...", real));
        tracker.progress(RENDER_PROGRESS_SHARE as u8);

        let video = self
            .concatenator
            .concatenate(segments, &options.output_path)
            .await?;
        drop(run_dir);

        Ok(RunOutcome {
            video,
            failures: failures.clone(),
        })
    }
}

/// Removes `run-*` scratch directories left in `work_root` by interrupted
/// processes. Other entries are left alone. Must not be called while another
/// run uses the same work root.
pub async fn clear_stale_runs(work_root: &Path) -> Result<()> {
    if !dir_exists(work_root).await {
        return Ok(());
    }

    for entry in WalkDir::new(work_root).min_depth(1).max_depth(1) {
        let entry = entry?;
        let is_run_dir = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(RUN_DIR_PREFIX));
        if is_run_dir {
            fs::remove_dir_all(entry.path())
                .await
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            logi(format!("Removed stale run directory: {}", entry.path().display()));
        }
    }
    Ok(())
}

/// Asks the configured story writer for a story and saves it under the output directory.
pub async fn generate_story(cfg: &Config, subject: &str, scene_count: u32) -> Result<(StoryDocument, PathBuf)> {
    let clients = synth::build_clients(cfg)?;
    let story = clients
        .writer
        .write_story(subject, scene_count)
        .await
        .with_context(|| format!("Story generation failed for {}", subject))?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let animal = subject.trim().to_lowercase().replace(char::is_whitespace, "_");
    let path = cfg.output_dir.join(format!("{}_openai_{}.json", animal, stamp));
    story.save(&path).await?;
    logok(format!("Story saved: {}", path.display()));
    Ok((story, path))
}

/// Renders `story` with the configured backends and ffmpeg.
pub async fn generate_video(
    cfg: &Config,
    story: &StoryDocument,
    output_path: Option<PathBuf>,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<RunReport> {
    let clients = synth::build_clients(cfg)?;
    let encoder: Arc<dyn MediaEncoder> = Arc::new(FfmpegEncoder::default());
    let generator = StoryVideoGenerator::new(clients.narrator, clients.illustrator, encoder, &cfg.work_dir)
        .with_retry(cfg.retry);

    let output_path = output_path.unwrap_or_else(|| story.default_output_path(&cfg.output_dir));
    let options = RunOptions::from_config(cfg, output_path);
    let (result, failures) = generator.execute(story, &options, sink, cancel).await;
    Ok(RunReport::from_run(&result, &failures))
}

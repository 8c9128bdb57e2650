use crate::error::{EncodingError, SceneFailure, SceneRenderError, SynthesisError};
use crate::generator::RetryPolicy;
use crate::media::{FrameSize, MediaAsset, MediaEncoder, MediaKind, RenderedSegment};
use crate::progress::CancelToken;
use crate::story::Scene;
use crate::synth::{Illustrator, Narrator};
use crate::logw;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_retry2::{Retry, RetryError};

const MIN_PLACEHOLDER_SECONDS: f64 = 1.0;

/// Turns one scene into a timed video segment of an exact frame size.
#[derive(Clone)]
pub struct SceneRenderer {
    narrator: Arc<dyn Narrator>,
    illustrator: Arc<dyn Illustrator>,
    encoder: Arc<dyn MediaEncoder>,
    retry: RetryPolicy,
}

impl SceneRenderer {
    pub fn new(
        narrator: Arc<dyn Narrator>,
        illustrator: Arc<dyn Illustrator>,
        encoder: Arc<dyn MediaEncoder>,
    ) -> Self {
        Self {
            narrator,
            illustrator,
            encoder,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Illustration first, then narration; the narrator is never called for a
    /// scene whose illustration failed.
    pub async fn render(
        &self,
        scene_index: usize,
        scene: &Scene,
        voice_id: &str,
        target: FrameSize,
        run_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<RenderedSegment, SceneRenderError> {
        let fail = |cause| SceneRenderError { scene_index, cause };

        let image_path = run_dir.join(format!("scene_{:03}_image.png", scene_index));
        let image = self
            .attempt(cancel, "illustration", scene_index, || {
                self.illustrator.render(&scene.image_prompt, target, &image_path)
            })
            .await
            .map_err(|e| fail(e.map_or(SceneFailure::Cancelled, SceneFailure::Illustration)))?;

        let audio_path = run_dir.join(format!("scene_{:03}_audio.mp3", scene_index));
        let audio = self
            .attempt(cancel, "narration", scene_index, || {
                self.narrator.synthesize(&scene.narration, voice_id, &audio_path)
            })
            .await
            .map_err(|e| fail(e.map_or(SceneFailure::Cancelled, SceneFailure::Narration)))?;

        let duration = self
            .encoder
            .probe_duration(audio.path())
            .await
            .map_err(|e| fail(SceneFailure::Media(e)))?;

        let video_path = run_dir.join(format!("scene_{:03}_segment.mp4", scene_index));
        let video = self
            .encode(
                target,
                &video_path,
                cancel,
                self.encoder
                    .still_segment(image.path(), audio.path(), duration, target, &video_path),
            )
            .await
            .map_err(fail)?;

        Ok(RenderedSegment {
            scene_index,
            scene_number: scene.display_number(scene_index),
            image: Some(image),
            audio: Some(audio),
            video,
            duration_seconds: duration,
            frame: target,
            placeholder: false,
        })
    }

    /// Black, silent stand-in lasting the scene's advisory duration.
    pub async fn placeholder(
        &self,
        scene_index: usize,
        scene: &Scene,
        target: FrameSize,
        run_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<RenderedSegment, SceneRenderError> {
        let duration = if scene.duration_hint.is_finite() {
            scene.duration_hint.max(MIN_PLACEHOLDER_SECONDS)
        } else {
            MIN_PLACEHOLDER_SECONDS
        };
        let video_path = run_dir.join(format!("scene_{:03}_placeholder.mp4", scene_index));
        let video = self
            .encode(
                target,
                &video_path,
                cancel,
                self.encoder.blank_segment(duration, target, &video_path),
            )
            .await
            .map_err(|cause| SceneRenderError { scene_index, cause })?;

        Ok(RenderedSegment {
            scene_index,
            scene_number: scene.display_number(scene_index),
            image: None,
            audio: None,
            video,
            duration_seconds: duration,
            frame: target,
            placeholder: true,
        })
    }

    /// Runs an encode step writing `out` and checks the produced frame size.
    async fn encode(
        &self,
        target: FrameSize,
        out: &Path,
        cancel: &CancelToken,
        step: impl Future<Output = Result<(), EncodingError>>,
    ) -> Result<MediaAsset, SceneFailure> {
        let video = MediaAsset::new(MediaKind::Video, out);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SceneFailure::Cancelled),
            res = step => res.map_err(SceneFailure::Media)?,
        }

        let found = self
            .encoder
            .probe_frame(video.path())
            .await
            .map_err(SceneFailure::Media)?;
        if found != target {
            return Err(SceneFailure::Media(EncodingError::DimensionMismatch {
                expected: target,
                found,
            }));
        }
        Ok(video)
    }

    /// Retries retryable synthesis errors with backoff. `Err(None)` means cancelled.
    async fn attempt<F, Fut>(
        &self,
        cancel: &CancelToken,
        what: &str,
        scene_index: usize,
        mut call: F,
    ) -> Result<MediaAsset, Option<SynthesisError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<MediaAsset, SynthesisError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;
        let retried = Retry::spawn(self.retry.strategy(), || {
            attempt += 1;
            let current = attempt;
            let fut = call();
            async move {
                match fut.await {
                    Ok(asset) => Ok(asset),
                    Err(err) if err.is_retryable() => {
                        if current < max_attempts {
                            logw(format!(
                                "Scene {} {} attempt {}/{} failed, will retry: {}",
                                scene_index + 1,
                                what,
                                current,
                                max_attempts,
                                err
                            ));
                        }
                        Err(RetryError::Transient {
                            err,
                            retry_after: None,
                        })
                    }
                    Err(err) => Err(RetryError::Permanent(err)),
                }
            }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(None),
            res = retried => res.map_err(Some),
        }
    }
}

pub mod api;
pub mod concat;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod media;
pub mod progress;
pub mod prompt;
pub mod renderer;
pub mod story;
pub mod synth;

pub use concat::{Concatenator, FinalVideo};
pub use config::Config;
pub use error::{
    EncodingError, PipelineError, SceneFailure, SceneRenderError, SchemaError, SynthesisError,
};
pub use generator::{
    FailurePolicy, RetryPolicy, RunOptions, RunOutcome, RunReport, SceneFailureRecord,
    StoryVideoGenerator,
};
pub use media::{FrameSize, MediaAsset, MediaEncoder, MediaKind, RenderedSegment, SizeClass};
pub use progress::{CallbackSink, CancelToken, NoopSink, ProgressSink, RunPhase};
pub use story::{Scene, StoryDocument};
pub use synth::{Illustrator, Narrator, StoryWriter};

pub(crate) fn logi(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    tracing::info!(ok = true, "{}", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}

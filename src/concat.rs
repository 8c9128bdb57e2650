use crate::error::EncodingError;
use crate::logi;
use crate::media::{MediaEncoder, RenderedSegment};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// The assembled story video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalVideo {
    pub path: PathBuf,
    /// Sum of the incorporated segment durations.
    pub duration_seconds: f64,
    /// Scenes that rendered for real; placeholders are not counted.
    pub scene_count: usize,
    pub placeholder_count: usize,
    /// Scene indices in the order they appear in the video.
    pub scene_order: Vec<usize>,
}

/// Merges ordered segments into one file at the output path.
///
/// The video is staged next to the destination and only renamed into place
/// once the encoder has finished, so a failed or cancelled write never leaves
/// a partial file at `output_path`.
pub struct Concatenator {
    encoder: Arc<dyn MediaEncoder>,
}

impl Concatenator {
    pub fn new(encoder: Arc<dyn MediaEncoder>) -> Self {
        Self { encoder }
    }

    /// Consumes `segments`; their assets are removed whether or not the write succeeds.
    pub async fn concatenate(
        &self,
        segments: Vec<RenderedSegment>,
        output_path: &Path,
    ) -> Result<FinalVideo, EncodingError> {
        let Some(first) = segments.first() else {
            return Err(EncodingError::Empty);
        };
        let expected = first.frame;
        if let Some(odd) = segments.iter().find(|s| s.frame != expected) {
            return Err(EncodingError::DimensionMismatch {
                expected,
                found: odd.frame,
            });
        }

        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .map_err(|source| EncodingError::NotWritable {
                path: parent.clone(),
                source,
            })?;

        let staging = tempfile::Builder::new()
            .prefix(".story-")
            .suffix(".mp4")
            .tempfile_in(&parent)
            .map_err(|source| EncodingError::NotWritable {
                path: output_path.to_path_buf(),
                source,
            })?;

        logi(format!(
            "Concatenating {} segments into {}",
            segments.len(),
            output_path.display()
        ));
        let inputs: Vec<&Path> = segments.iter().map(|s| s.video.path()).collect();
        self.encoder.concat(&inputs, staging.path()).await?;

        staging
            .persist(output_path)
            .map_err(|e| EncodingError::NotWritable {
                path: output_path.to_path_buf(),
                source: e.error,
            })?;

        Ok(FinalVideo {
            path: output_path.to_path_buf(),
            duration_seconds: segments.iter().map(|s| s.duration_seconds).sum(),
            scene_count: segments.iter().filter(|s| !s.placeholder).count(),
            placeholder_count: segments.iter().filter(|s| s.placeholder).count(),
            scene_order: segments.iter().map(|s| s.scene_index).collect(),
        })
    }
}

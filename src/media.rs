use crate::error::EncodingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Rounds both sides down to even values, as yuv420p output requires.
    pub fn even(self) -> Self {
        Self {
            width: self.width & !1,
            height: self.height & !1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output shapes an illustration backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Square,
    Landscape,
    Portrait,
}

impl SizeClass {
    const ALL: [SizeClass; 3] = [SizeClass::Square, SizeClass::Landscape, SizeClass::Portrait];

    /// Picks the class whose aspect ratio is closest to `target` on a log scale.
    pub fn nearest(target: FrameSize) -> Self {
        let want = target.aspect().ln();
        let mut best = SizeClass::Square;
        let mut best_dist = f64::MAX;
        for class in Self::ALL {
            let dist = (class.dimensions().aspect().ln() - want).abs();
            if dist < best_dist {
                best = class;
                best_dist = dist;
            }
        }
        best
    }

    pub fn dimensions(self) -> FrameSize {
        match self {
            SizeClass::Square => FrameSize::new(1024, 1024),
            SizeClass::Landscape => FrameSize::new(1792, 1024),
            SizeClass::Portrait => FrameSize::new(1024, 1792),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

/// A file produced while rendering. The file is deleted when the asset is
/// dropped unless [`MediaAsset::keep`] was called.
#[derive(Debug)]
pub struct MediaAsset {
    kind: MediaKind,
    path: PathBuf,
    keep: bool,
}

impl MediaAsset {
    pub fn new(kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            keep: false,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases ownership of the file and leaves it on disk.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for MediaAsset {
    fn drop(&mut self) {
        if !self.keep && !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// One scene rendered to a timed video segment.
#[derive(Debug)]
pub struct RenderedSegment {
    pub scene_index: usize,
    pub scene_number: u32,
    pub image: Option<MediaAsset>,
    pub audio: Option<MediaAsset>,
    pub video: MediaAsset,
    /// Measured narration length; authoritative for timing.
    pub duration_seconds: f64,
    pub frame: FrameSize,
    /// Stand-in for a scene that failed to render.
    pub placeholder: bool,
}

/// Probing and encoding operations the renderer and concatenator rely on.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    async fn probe_duration(&self, media: &Path) -> Result<f64, EncodingError>;

    async fn probe_frame(&self, video: &Path) -> Result<FrameSize, EncodingError>;

    /// Encodes `image` fitted to exactly `frame`, shown for `duration` seconds with `audio`.
    async fn still_segment(
        &self,
        image: &Path,
        audio: &Path,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError>;

    /// Encodes a black, silent segment.
    async fn blank_segment(
        &self,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError>;

    /// Joins `segments` in the given order into `out`.
    async fn concat(&self, segments: &[&Path], out: &Path) -> Result<(), EncodingError>;
}

use crate::error::EncodingError;
use crate::media::{FrameSize, MediaEncoder};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

const DEFAULT_FPS: u32 = 24;
const AUDIO_RATE: &str = "44100";

async fn run_cmd(args: &[String]) -> Result<(), EncodingError> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    cmd.kill_on_drop(true);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| EncodingError::Encoder(format!("failed to run {}: {}", args[0], e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet = stderr.trim().chars().take(800).collect::<String>();
        return Err(EncodingError::Encoder(format!(
            "{} exited with {}: {}",
            args[0], output.status, snippet
        )));
    }

    Ok(())
}

fn base_args() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn h264_aac_args() -> Vec<String> {
    [
        "-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22", "-c:a",
        "aac", "-b:a", "192k", "-ar", AUDIO_RATE, "-ac", "2", "-movflags", "+faststart",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scale to fit inside the frame, then pad with black bars to the exact size.
fn letterbox_filter(frame: FrameSize) -> String {
    format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,format=yuv420p[v]",
        w = frame.width,
        h = frame.height
    )
}

fn concat_list_entry(segment: &Path, list_dir: &Path) -> String {
    let rel = pathdiff::diff_paths(segment, list_dir).unwrap_or_else(|| segment.to_path_buf());
    let text = rel.display().to_string().replace('\'', r"'\''");
    format!("file '{}'\n", text)
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<FrameSize, EncodingError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| probe_error(path, format!("ffprobe execution failed: {e}")))?;

    if !output.status.success() {
        return Err(probe_error(path, "ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts.next().and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
    let h = parts.next().and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);

    let frame = FrameSize::new(w, h);
    if frame.is_empty() {
        return Err(probe_error(path, format!("invalid dimensions '{text}'")));
    }
    Ok(frame)
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64, EncodingError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| probe_error(path, format!("ffprobe execution failed: {e}")))?;

    if !output.status.success() {
        return Err(probe_error(path, "ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(probe_error(path, format!("invalid duration '{text}'")));
    }
    Ok(duration)
}

fn probe_error(path: &Path, message: impl Into<String>) -> EncodingError {
    EncodingError::Probe {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// [`MediaEncoder`] backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    fps: u32,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self { fps: DEFAULT_FPS }
    }
}

impl FfmpegEncoder {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn probe_duration(&self, media: &Path) -> Result<f64, EncodingError> {
        ffprobe_duration_seconds(media).await
    }

    async fn probe_frame(&self, video: &Path) -> Result<FrameSize, EncodingError> {
        ffprobe_video_dimensions(video).await
    }

    async fn still_segment(
        &self,
        image: &Path,
        audio: &Path,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError> {
        let mut args = base_args();
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            image.display().to_string(),
            "-i".to_string(),
            audio.display().to_string(),
            "-filter_complex".to_string(),
            letterbox_filter(frame),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-tune".to_string(),
            "stillimage".to_string(),
        ]);
        args.extend(h264_aac_args());
        args.extend([
            "-t".to_string(),
            format!("{:.3}", duration),
            out.display().to_string(),
        ]);
        run_cmd(&args).await?;
        expect_output(out).await
    }

    async fn blank_segment(
        &self,
        duration: f64,
        frame: FrameSize,
        out: &Path,
    ) -> Result<(), EncodingError> {
        let mut args = base_args();
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "color=c=black:s={}x{}:r={}:d={:.3}",
                frame.width, frame.height, self.fps, duration
            ),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("anullsrc=r={}:cl=stereo", AUDIO_RATE),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
        ]);
        args.extend(h264_aac_args());
        args.extend([
            "-t".to_string(),
            format!("{:.3}", duration),
            out.display().to_string(),
        ]);
        run_cmd(&args).await?;
        expect_output(out).await
    }

    async fn concat(&self, segments: &[&Path], out: &Path) -> Result<(), EncodingError> {
        if segments.is_empty() {
            return Err(EncodingError::Empty);
        }

        let list_dir = out
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let list = tempfile::Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(&list_dir)
            .map_err(|source| EncodingError::NotWritable {
                path: list_dir.clone(),
                source,
            })?;

        let list_dir_abs = fs::canonicalize(&list_dir).await?;
        let mut body = String::new();
        for segment in segments {
            let segment_abs = fs::canonicalize(segment).await?;
            body.push_str(&concat_list_entry(&segment_abs, &list_dir_abs));
        }
        fs::write(list.path(), body).await?;

        let mut args = base_args();
        args.extend([
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list.path().display().to_string(),
        ]);
        args.extend(h264_aac_args());
        args.extend(["-f".to_string(), "mp4".to_string(), out.display().to_string()]);
        run_cmd(&args).await?;
        expect_output(out).await
    }
}

async fn expect_output(out: &Path) -> Result<(), EncodingError> {
    match fs::metadata(out).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(EncodingError::Encoder(format!(
            "no output written to {}",
            out.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_pads_to_exact_frame() {
        let filter = letterbox_filter(FrameSize::new(1024, 1792));
        assert!(filter.contains("scale=1024:1792:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1024:1792:(ow-iw)/2:(oh-ih)/2:black"));
    }

    #[test]
    fn concat_entries_are_relative_and_quoted() {
        let entry = concat_list_entry(
            Path::new("/tmp/run/work/scene_000_segment.mp4"),
            Path::new("/tmp/run"),
        );
        assert_eq!(entry, "file 'work/scene_000_segment.mp4'\n");

        let quoted = concat_list_entry(Path::new("/tmp/run/fox's.mp4"), Path::new("/tmp/run"));
        assert_eq!(quoted, "file 'fox'\\''s.mp4'\n");
    }
}

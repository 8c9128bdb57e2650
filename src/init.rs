use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Creates the output and work directories named by `cfg`.
pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.output_dir, &cfg.work_dir] {
        if !dir_exists(dir).await {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub(crate) async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn tool_available(program: &str) -> bool {
    match tokio::process::Command::new(program)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Both `ffmpeg` and `ffprobe` must be on PATH for rendering.
pub async fn check_ffmpeg() -> bool {
    tool_available("ffmpeg").await && tool_available("ffprobe").await
}

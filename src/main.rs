mod cli;

use animal_story_video::generator::{clear_stale_runs, generate_story, generate_video};
use animal_story_video::{CancelToken, Config, ProgressSink, RunPhase, StoryDocument, init};
use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, RenderArgs};
use tracing_subscriber::EnvFilter;

/// Prints progress and status lines to stderr for terminal runs.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_progress(&self, percent: u8) {
        eprintln!("[{:>3}%]", percent);
    }

    fn on_status(&self, message: &str) {
        eprintln!("[INFO] {}", message);
    }

    fn on_phase(&self, phase: RunPhase) {
        tracing::debug!(%phase, "phase");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config).await?;
    init::ensure_directories(&cfg).await?;

    let code = match cli.command {
        Command::Story { animal, scenes } => {
            cfg.validate()?;
            let (story, path) = generate_story(&cfg, &animal, scenes.unwrap_or(cfg.scene_count)).await?;
            println!("{}", path.display());
            eprintln!("[INFO] {} ({} scenes)", story.title, story.scenes.len());
            0
        }
        Command::Video { story, render } => {
            let story = StoryDocument::load(&story).await?;
            render_story(&mut cfg, &story, &render).await?
        }
        Command::Make { animal, scenes, render } => {
            cfg.validate()?;
            let (story, path) = generate_story(&cfg, &animal, scenes.unwrap_or(cfg.scene_count)).await?;
            eprintln!("[INFO] Story saved: {}", path.display());
            render_story(&mut cfg, &story, &render).await?
        }
    };

    std::process::exit(code);
}

async fn render_story(cfg: &mut Config, story: &StoryDocument, render: &RenderArgs) -> Result<i32> {
    render.apply(cfg);
    cfg.validate()?;
    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] FFmpeg not found in PATH. Please install FFmpeg.");
    }

    clear_stale_runs(&cfg.work_dir).await?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("[WARNING] Interrupted, cancelling run...");
            on_interrupt.cancel();
        }
    });

    let report = generate_video(cfg, story, render.output.clone(), &ConsoleSink, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.success { 0 } else { 1 })
}

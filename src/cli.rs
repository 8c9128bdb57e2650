use animal_story_video::FailurePolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "animal-story-video", version, about = "Narrated slideshow videos from animal stories")]
pub struct Cli {
    /// Settings file; missing keys fall back to defaults and the environment.
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a story document for an animal and save it as JSON.
    Story {
        animal: String,
        #[arg(short, long)]
        scenes: Option<u32>,
    },
    /// Render a saved story document to a video.
    Video {
        story: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Write a story and render it in one go.
    Make {
        animal: String,
        #[arg(short, long)]
        scenes: Option<u32>,
        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct RenderArgs {
    #[arg(long)]
    pub voice: Option<String>,
    /// Destination file; defaults to the sanitized story title under the output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
    #[arg(long)]
    pub concurrency: Option<usize>,
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PolicyArg {
    Skip,
    Abort,
    Placeholder,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Skip => FailurePolicy::Skip,
            PolicyArg::Abort => FailurePolicy::Abort,
            PolicyArg::Placeholder => FailurePolicy::Placeholder,
        }
    }
}

impl RenderArgs {
    /// Command-line values win over the settings file.
    pub fn apply(&self, cfg: &mut animal_story_video::Config) {
        if let Some(voice) = &self.voice {
            cfg.voice = Some(voice.clone());
        }
        if let Some(width) = self.width {
            cfg.width = width;
        }
        if let Some(height) = self.height {
            cfg.height = height;
        }
        if let Some(policy) = self.policy {
            cfg.failure_policy = policy.into();
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency.max(1);
        }
        if let Some(retries) = self.retries {
            cfg.retry.max_attempts = retries.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animal_story_video::Config;

    #[test]
    fn video_flags_override_config() {
        let cli = Cli::parse_from([
            "animal-story-video",
            "video",
            "fox.json",
            "--width",
            "1280",
            "--height",
            "720",
            "--policy",
            "placeholder",
            "--retries",
            "2",
        ]);
        let Command::Video { story, render } = cli.command else {
            panic!("expected video command");
        };
        assert_eq!(story, PathBuf::from("fox.json"));
        let mut cfg = Config::default();
        render.apply(&mut cfg);
        assert_eq!((cfg.width, cfg.height), (1280, 720));
        assert_eq!(cfg.failure_policy, FailurePolicy::Placeholder);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn make_takes_scene_count() {
        let cli = Cli::parse_from(["animal-story-video", "make", "Owl", "-s", "3"]);
        assert!(matches!(cli.command, Command::Make { ref animal, scenes: Some(3), .. } if animal == "Owl"));
    }
}

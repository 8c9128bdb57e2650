use animal_story_video::ffmpeg::FfmpegEncoder;
use animal_story_video::{FrameSize, MediaEncoder};
use std::path::Path;

fn tool_available(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn ffmpeg_available() -> bool {
    tool_available("ffmpeg") && tool_available("ffprobe")
}

fn lavfi(source: &str, extra: &[&str], out: &Path) {
    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i", source])
        .args(extra)
        .arg(out)
        .status()
        .expect("spawn ffmpeg");
    assert!(status.success(), "ffmpeg failed for {source}");
}

#[tokio::test]
async fn letterboxes_and_concatenates_real_media() {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("wide.png");
    let audio = dir.path().join("voice.wav");
    lavfi("color=c=red:s=640x480", &["-frames:v", "1"], &image);
    lavfi("sine=frequency=440:duration=1", &[], &audio);

    let encoder = FfmpegEncoder::new(24);
    let frame = FrameSize::new(360, 640);

    let duration = encoder.probe_duration(&audio).await.unwrap();
    assert!((duration - 1.0).abs() < 0.1, "{duration}");

    let still = dir.path().join("still.mp4");
    encoder
        .still_segment(&image, &audio, duration, frame, &still)
        .await
        .unwrap();
    assert_eq!(encoder.probe_frame(&still).await.unwrap(), frame);

    let blank = dir.path().join("blank.mp4");
    encoder.blank_segment(1.0, frame, &blank).await.unwrap();
    assert_eq!(encoder.probe_frame(&blank).await.unwrap(), frame);

    let out = dir.path().join("out dir").join("final.mp4");
    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
    encoder.concat(&[&still, &blank], &out).await.unwrap();

    assert_eq!(encoder.probe_frame(&out).await.unwrap(), frame);
    let total = encoder.probe_duration(&out).await.unwrap();
    assert!((total - 2.0).abs() < 0.3, "{total}");
    let leftovers: Vec<_> = std::fs::read_dir(out.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, [std::ffi::OsString::from("final.mp4")]);
}

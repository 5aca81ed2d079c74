use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{error, info};

use srt_gen::config::Config;
use srt_gen::media::MediaToolkit;
use srt_gen::pipeline::Pipeline;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "srt_gen=info,warn".into()),
        )
        .init();

    let matches = Command::new("srt-gen")
        .version("0.1.0")
        .about("Long-form audio to refined SRT transcripts")
        .arg(
            Arg::new("audio")
                .value_name("INPUT")
                .help("Audio file to transcribe, or a video to extract audio from")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output SRT path (defaults to the audio name with .srt)"),
        )
        .arg(
            Arg::new("work-dir")
                .short('w')
                .long("work-dir")
                .value_name("DIR")
                .help("Working directory for chunks and cached transcripts"),
        )
        .arg(
            Arg::new("language")
                .short('l')
                .long("language")
                .value_name("LANG")
                .help("Language hint for transcription"),
        )
        .arg(
            Arg::new("no-refine")
                .long("no-refine")
                .help("Skip the LLM refinement pass")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let input = PathBuf::from(matches.get_one::<String>("audio").unwrap());
    if !input.exists() {
        error!("input file does not exist: {}", input.display());
        return Err(anyhow::anyhow!("input file not found"));
    }

    let srt_out = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("srt"));

    let mut config = Config::load()?;
    if let Some(dir) = matches.get_one::<String>("work-dir") {
        config.output.work_dir = PathBuf::from(dir);
    }
    if let Some(language) = matches.get_one::<String>("language") {
        config.transcription.language = Some(language.clone());
    }
    if matches.get_flag("no-refine") {
        config.refine.enabled = false;
    }

    info!("input: {}", input.display());
    info!("output: {}", srt_out.display());
    info!("work dir: {}", config.output.work_dir.display());

    tokio::fs::create_dir_all(&config.output.work_dir).await?;

    // Video containers get their audio track pulled out first.
    let is_video = input
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false);
    let audio = if is_video {
        let extracted = config
            .output
            .work_dir
            .join(input.file_stem().unwrap_or_default())
            .with_extension("mp3");
        let media = MediaToolkit {
            noise_floor_db: config.audio.noise_floor_db,
            min_silence: config.audio.min_silence_seconds,
        };
        media.extract_audio(&input, &extracted).await?;
        extracted
    } else {
        input
    };

    let pipeline = Pipeline::new(config).await?;
    let report = pipeline.run(&audio, &srt_out).await?;

    info!(
        "done in {:.1}s: {} chunks, {} subtitle entries ({} refinement) -> {}",
        report.elapsed.as_secs_f64(),
        report.chunk_count,
        report.segment_count,
        if report.refined { "with" } else { "without" },
        report.srt_path.display()
    );

    Ok(())
}

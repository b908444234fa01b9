use anyhow::{bail, Context};
use quietcam::native::NokhwaCamera;
use quietcam::{
    CameraError, CaptureFrequency, CaptureResultListener, CapturedArtifact, QuietCamConfig,
    StillCaptureSession, SystemPermissions, VideoCaptureSession,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct PrintListener {
    json: bool,
}

impl CaptureResultListener for PrintListener {
    fn on_artifact_ready(&mut self, artifact: CapturedArtifact) {
        if self.json {
            match serde_json::to_string(&artifact) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to serialize artifact: {}", e),
            }
        } else {
            println!("{} saved to {}", artifact.kind, artifact.path.display());
        }
    }

    fn on_capture_error(&mut self, error: CameraError) {
        eprintln!("Capture failed: {}", error);
    }
}

struct Options {
    device: u32,
    count: usize,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
}

fn main() -> anyhow::Result<()> {
    quietcam::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: quietcam-cli <photo|video> [--device <n>] [--count <n>] [--out <dir>] [--config <file>] [--json]");
        std::process::exit(1);
    }

    let options = parse_options(&args[2..])?;
    match args[1].as_str() {
        "photo" => cmd_photo(&options),
        "video" => cmd_video(&options),
        other => bail!("Unknown command: {}", other),
    }
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options {
        device: 0,
        count: 1,
        output: None,
        config: None,
        json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--device" => {
                i += 1;
                options.device = args.get(i).context("--device needs a value")?.parse()?;
            }
            "--count" => {
                i += 1;
                options.count = args.get(i).context("--count needs a value")?.parse()?;
            }
            "--out" => {
                i += 1;
                options.output = Some(PathBuf::from(args.get(i).context("--out needs a value")?));
            }
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(
                    args.get(i).context("--config needs a value")?,
                ));
            }
            "--json" => options.json = true,
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }
    Ok(options)
}

fn load_config(options: &Options) -> anyhow::Result<(QuietCamConfig, PathBuf)> {
    let config = match &options.config {
        Some(path) => QuietCamConfig::load_from_file(path)?,
        None => QuietCamConfig::load_or_default(),
    };
    config.validate()?;
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| config.output_directory());
    Ok((config, output))
}

fn cmd_photo(options: &Options) -> anyhow::Result<()> {
    let (config, output) = load_config(options)?;
    let mut session = StillCaptureSession::open(
        Arc::new(NokhwaCamera::new(options.device)),
        &SystemPermissions,
        config.session_config()?,
        output,
        PrintListener { json: options.json },
    )?
    .with_namer(config.artifact_namer());

    session.start()?;
    match session.config().frequency {
        CaptureFrequency::OneShot => {
            for _ in 0..options.count {
                session.capture_image()?;
                session.wait_for_completion(Duration::from_secs(10));
            }
        }
        CaptureFrequency::Recurring(interval) => {
            eprintln!("Capturing {} stills every {:?}", options.count, interval);
            let mut delivered = 0;
            while delivered < options.count {
                delivered += session.wait_for_completion(Duration::from_millis(100));
            }
        }
    }
    session.destroy()?;
    Ok(())
}

fn cmd_video(options: &Options) -> anyhow::Result<()> {
    let (config, output) = load_config(options)?;
    let mut session = VideoCaptureSession::open(
        Arc::new(NokhwaCamera::new(options.device)),
        &SystemPermissions,
        config.session_config()?,
        output,
        PrintListener { json: options.json },
    )?
    .with_namer(config.artifact_namer());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    session.start()?;
    session.capture_video()?;
    eprintln!("Recording, press Ctrl-C to stop");
    while !interrupted.load(Ordering::SeqCst) {
        session.wait_for_completion(Duration::from_millis(100));
        if session.recording_state() == quietcam::RecordingState::Idle {
            break;
        }
    }
    if session.recording_state() == quietcam::RecordingState::Recording {
        session.capture_video()?;
    }
    session.wait_for_completion(Duration::from_secs(5));
    session.destroy()?;
    Ok(())
}

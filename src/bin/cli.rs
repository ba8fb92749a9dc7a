use anyhow::{anyhow, bail, Context, Result};
use idcapture::config::{CaptureProfile, DetectionConfig, IdCaptureConfig};
use idcapture::pipeline::{analyze_still, CaptureLoop};
use idcapture::sampler::{
    CameraSource, FixedRateScheduler, FrameSource, MonotonicClock, StillImageSource,
};
use idcapture::session::LiveSession;
use idcapture::{CapturePhase, DetectionResult, FaceModelSession};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;

const USAGE: &str = "Usage:
  idcapture-cli analyze <image> [--profile front|back|selfie] [--config <path>] [--json]
  idcapture-cli watch <image|camera:N> [--profile p] [--config <path>] [--timeout <ms>] [--json]";

struct Options {
    target: String,
    profile: Option<CaptureProfile>,
    config_path: Option<String>,
    timeout_ms: u64,
    json: bool,
}

fn main() -> Result<()> {
    idcapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let options = parse_options(&args[2..])?;
    match args[1].as_str() {
        "analyze" => cmd_analyze(&options),
        "watch" => cmd_watch(&options),
        other => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut target = None;
    let mut profile = None;
    let mut config_path = None;
    let mut timeout_ms = 30_000;
    let mut json = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--profile" => {
                let value = iter.next().ok_or_else(|| anyhow!("--profile needs a value"))?;
                profile = Some(value.parse::<CaptureProfile>().map_err(|e| anyhow!(e))?);
            }
            "--config" => {
                let value = iter.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(value.clone());
            }
            "--timeout" => {
                let value = iter.next().ok_or_else(|| anyhow!("--timeout needs a value"))?;
                timeout_ms = value.parse().context("--timeout must be milliseconds")?;
            }
            "--json" => json = true,
            other if other.starts_with("--") => bail!("unknown option {}", other),
            other => {
                if target.replace(other.to_string()).is_some() {
                    bail!("only one source may be given");
                }
            }
        }
    }

    Ok(Options {
        target: target.ok_or_else(|| anyhow!("source required\n{}", USAGE))?,
        profile,
        config_path,
        timeout_ms,
        json,
    })
}

fn detection_config(options: &Options) -> Result<DetectionConfig> {
    if let Some(profile) = options.profile {
        return Ok(DetectionConfig::for_profile(profile));
    }
    let config = match &options.config_path {
        Some(path) => IdCaptureConfig::load_from_file(path)?,
        None => IdCaptureConfig::load_or_default(),
    };
    Ok(config.detection)
}

fn open_source(target: &str) -> Result<Box<dyn FrameSource>> {
    match target.strip_prefix("camera:") {
        Some(device_id) => Ok(Box::new(CameraSource::open(device_id)?)),
        None => Ok(Box::new(StillImageSource::open(target)?)),
    }
}

fn cmd_analyze(options: &Options) -> Result<()> {
    let config = detection_config(options)?;
    let mut source = StillImageSource::open(&options.target)?;
    let frame = source.current_frame()?.clone();
    let result = analyze_still(frame, config, FaceModelSession::new())?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &DetectionResult) {
    println!(
        "document: {} (confidence {:.2})",
        if result.document_detected { "found" } else { "not found" },
        result.document_confidence
    );
    if let Some(b) = result.document_bounds {
        println!("  bounds: x={:.0} y={:.0} {:.0}x{:.0}", b.x, b.y, b.width, b.height);
    }
    let flag = |set: bool, label: &'static str| if set { label } else { "" };
    println!("sharpness: {:.2}{}", result.blur_score, flag(result.is_blurry, " (blurry)"));
    println!("glare: {:.2}{}", result.glare_score, flag(result.has_glare, " (glare)"));
    println!("face: {}", if result.face_detected { "present" } else { "none" });
    println!(
        "quality: {} ({:.2}), ready for capture: {}",
        result.overall_quality.as_str(),
        result.quality_score,
        result.ready_for_capture
    );
}

fn cmd_watch(options: &Options) -> Result<()> {
    let config = detection_config(options)?;
    let source = open_source(&options.target)?;
    let capture_loop = CaptureLoop::new(
        source,
        config,
        FaceModelSession::new(),
        Arc::new(MonotonicClock::new()),
    )?;
    let session = LiveSession::start(capture_loop, FixedRateScheduler::display_refresh())?;
    let mut captures = session
        .take_captures()
        .ok_or_else(|| anyhow!("capture channel already taken"))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("error setting Ctrl-C handler")?;
    }

    let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
    let mut last_phase: Option<CapturePhase> = None;
    let mut captured = None;

    while !interrupted.load(Ordering::SeqCst) && Instant::now() < deadline {
        match captures.try_recv() {
            Ok(event) => {
                captured = Some(event);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let status = session.status();
        if last_phase != Some(status.auto_capture.phase) {
            last_phase = Some(status.auto_capture.phase);
            if !options.json {
                println!("phase: {:?}", status.auto_capture.phase);
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let stats = session.stop(Duration::from_secs(2))?;
    match captured {
        Some(event) => {
            if options.json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                println!("captured ({:?}) at {}ms", event.trigger, event.at_ms);
                println!(
                    "frames analysed: {}, ready: {}, skipped ticks: {}",
                    stats.frames_analyzed, stats.ready_frames, stats.frames_skipped
                );
            }
            Ok(())
        }
        None if interrupted.load(Ordering::SeqCst) => bail!("interrupted before capture"),
        None => bail!("no capture within {}ms", options.timeout_ms),
    }
}

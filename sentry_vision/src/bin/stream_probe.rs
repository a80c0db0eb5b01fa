// Connectivity check for a single camera: opens the stream the same way the service
// does, reads for a while, and reports the frame rate and how many frames the
// motion gate flagged.

use anyhow::{Context, Result, bail};
use sentry_vision::config::MotionConfig;
use sentry_vision::core_modules::motion_gate::MotionGate;
use sentry_vision::logging::init_logging;
use sentry_vision::models::{Camera, ConnectionDescriptor};
use sentry_vision::stream::{OpenCvConnector, StreamConnector, StreamHandle};
use std::env;
use std::time::{Duration, Instant};

const DEFAULT_SECONDS: u64 = 10;

fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: stream_probe <host[:port]> [username] [password] [seconds] [stream_path]");
        return Ok(());
    }
    init_logging(None)?;

    let (host, port) = match args[1].rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            Some(port.parse::<u16>().with_context(|| format!("Invalid port: {port}"))?),
        ),
        None => (args[1].clone(), None),
    };
    let mut connection = ConnectionDescriptor::new(host);
    connection.port = port;
    if let (Some(user), Some(password)) = (args.get(2), args.get(3)) {
        connection = connection.with_credentials(user.clone(), password.clone());
    }
    let seconds = match args.get(4) {
        Some(raw) => raw.parse::<u64>().with_context(|| format!("Invalid duration: {raw}"))?,
        None => DEFAULT_SECONDS,
    };
    if let Some(path) = args.get(5) {
        connection.stream_path = path.clone();
    }
    let camera = Camera::new("probe", connection);

    // --- 2. Stream Initialization ---
    println!("Connecting to {}", camera.connection.redacted_url());
    let stream = match OpenCvConnector::new().open(&camera) {
        Ok(stream) => stream,
        Err(e) => bail!("Connection failed: {e}"),
    };
    let mut handle = StreamHandle::new(stream);
    let mut gate = MotionGate::new(MotionConfig::default());

    // --- 3. Read Loop ---
    let started = Instant::now();
    let deadline = Duration::from_secs(seconds);
    let (mut frames, mut failures, mut motion_frames) = (0u64, 0u64, 0u64);
    let mut resolution = None;
    while started.elapsed() < deadline {
        match handle.read_frame() {
            Ok(frame) => {
                frames += 1;
                resolution.get_or_insert((frame.width, frame.height));
                match gate.observe(&frame) {
                    Ok(true) => motion_frames += 1,
                    Ok(false) => {}
                    Err(e) => println!("Malformed frame: {e}"),
                }
            }
            Err(e) => {
                failures += 1;
                if failures % 10 == 1 {
                    println!("Read failed: {e}");
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
    handle.release();

    // --- 4. Report ---
    let elapsed = started.elapsed().as_secs_f64();
    match resolution {
        Some((width, height)) => println!("Resolution: {width}x{height}"),
        None => println!("No frames received"),
    }
    println!("Frames: {frames} in {elapsed:.1}s ({:.2} fps)", frames as f64 / elapsed.max(f64::EPSILON));
    println!("Read failures: {failures}");
    println!("Motion frames: {motion_frames}");
    Ok(())
}

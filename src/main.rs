use raspberry_pi_gestures::config::Config;
use raspberry_pi_gestures::output::{GestureWriter, PoseWriter};
use raspberry_pi_gestures::supervisor::Supervisor;
use raspberry_pi_gestures::utils::Utils;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "gestures.toml";

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = Utils::logger_init(&config.log_level) {
        eprintln!("Logger initialization failed: {}", e);
        std::process::exit(1);
    }
    log::info!("Gesture classifier started.");

    if let Err(e) = run(config) {
        log::error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
    log::info!("The application terminated successfully.");
}

/// # Explanation
/// The run function wires the configured output sinks to a supervisor, arms
/// the optional run-duration timer and then hands the thread to the
/// supervisor until shutdown.
fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let pose_sink: Box<dyn Write> = match &config.output.path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let gesture_sink: Box<dyn Write> = match &config.output.gesture_path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stderr()),
    };
    let pose_writer = PoseWriter::new(pose_sink, config.output.header)?;
    let gesture_writer = GestureWriter::new(gesture_sink);

    let shutdown = Arc::new(AtomicBool::new(false));
    if config.duration_s > 0 {
        let flag = shutdown.clone();
        let duration = Duration::from_secs(config.duration_s);
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            log::info!("Run duration of {:?} elapsed, shutting down.", duration);
            flag.store(true, Ordering::Relaxed);
        });
    }

    let mut supervisor = Supervisor::new(
        config.imu_config(),
        config.gesture_config(),
        shutdown,
        pose_writer,
        gesture_writer,
    );
    supervisor.run();

    Ok(())
}

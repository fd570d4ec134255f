use crate::bus::I2cBus;
use crate::devices::bno080::{ImuConfig, BNO080};
use crate::error::ImuError;
use crate::gesture::{GestureConfig, GestureDetector};
use crate::output::{GestureWriter, PoseWriter};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(2);
/// The backoff sleeps in slices so a shutdown request is seen promptly.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);
const METRICS_INTERVAL: Duration = Duration::from_secs(5);

/// The strategy the supervisor applies to one failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Count the drop and keep polling on the same session.
    Continue,
    /// Re-enable the reports on the open bus handle.
    Reenable,
    /// Tear the session down and bootstrap from scratch with backoff.
    Reinit,
}

/// # Explanation
/// The single place that maps the error taxonomy to a recovery strategy.
/// Timeouts are routine at low report rates and never justify a reset; a
/// reset announcement or a soft communication fault only needs the reports
/// re-enabled; everything else invalidates the whole session.
pub fn recovery_for(error: &ImuError) -> Recovery {
    match error {
        ImuError::Timeout(_) => Recovery::Continue,
        ImuError::SensorReset | ImuError::Comm(_) => Recovery::Reenable,
        ImuError::Bus(_)
        | ImuError::ShortRead { .. }
        | ImuError::ShortWrite { .. }
        | ImuError::InvalidHeader(_)
        | ImuError::OversizeFrame(_)
        | ImuError::Protocol(_)
        | ImuError::ProductId => Recovery::Reinit,
    }
}

#[derive(Debug)]
struct Metrics {
    window_start: Instant,
    total_frames: u64,
    window_frames: u64,
    total_drops: u64,
    last_error: Option<String>,
}

impl Metrics {
    fn new() -> Self {
        Metrics {
            window_start: Instant::now(),
            total_frames: 0,
            window_frames: 0,
            total_drops: 0,
            last_error: None,
        }
    }

    fn frame(&mut self) {
        self.total_frames += 1;
        self.window_frames += 1;
    }

    fn drop_one(&mut self, error: &ImuError) {
        self.total_drops += 1;
        self.last_error = Some(error.to_string());
    }

    fn maybe_report(&mut self, hub_error: Option<u8>) {
        let elapsed = self.window_start.elapsed();
        if elapsed < METRICS_INTERVAL {
            return;
        }

        let effective_hz = self.window_frames as f64 / elapsed.as_secs_f64();
        let attempts = self.total_frames + self.total_drops;
        let drop_pct = if attempts > 0 {
            100.0 * self.total_drops as f64 / attempts as f64
        } else {
            0.0
        };
        log::info!(
            "Metrics: {} frames total, {} in window ({:.1} Hz effective), {} drops ({:.1} %), last error: {}, hub code: {}",
            self.total_frames,
            self.window_frames,
            effective_hz,
            self.total_drops,
            drop_pct,
            self.last_error.as_deref().unwrap_or("none"),
            hub_error.map_or("none".to_string(), |code| format!("0x{:02X}", code)),
        );

        self.window_start = Instant::now();
        self.window_frames = 0;
    }
}

/// # Explanation
/// Orchestrates the sensor session and the gesture detector: it owns the
/// pose and gesture sinks, classifies every fault the session reports and
/// runs the matching recovery strategy. All core state lives on the thread
/// that calls `run`; the shutdown flag is the only datum shared with the
/// outside.
pub struct Supervisor {
    imu_config: ImuConfig,
    gesture_config: GestureConfig,
    shutdown: Arc<AtomicBool>,
    pose_writer: PoseWriter<Box<dyn Write>>,
    gesture_writer: GestureWriter<Box<dyn Write>>,
    metrics: Metrics,
}

impl Supervisor {
    pub fn new(
        imu_config: ImuConfig,
        gesture_config: GestureConfig,
        shutdown: Arc<AtomicBool>,
        pose_writer: PoseWriter<Box<dyn Write>>,
        gesture_writer: GestureWriter<Box<dyn Write>>,
    ) -> Self {
        Supervisor {
            imu_config,
            gesture_config,
            shutdown,
            pose_writer,
            gesture_writer,
            metrics: Metrics::new(),
        }
    }

    /// # Explanation
    /// Streams until the shutdown flag is raised. Each pass establishes a
    /// session (with exponential backoff while the sensor stays away) and
    /// polls it until a hard fault sends it back to the bootstrap. On the
    /// way out the buffered output is flushed.
    pub fn run(&mut self) {
        while !self.shutdown() {
            let imu = match self.connect() {
                Some(imu) => imu,
                None => break,
            };
            // The baseline depends on the session epoch, so every session
            // gets a fresh detector.
            let mut detector = GestureDetector::new(self.gesture_config);
            self.stream(imu, &mut detector);
        }

        if let Err(e) = self.pose_writer.flush() {
            log::error!("Could not flush the pose stream: {}", e);
        }
        if let Err(e) = self.gesture_writer.flush() {
            log::error!("Could not flush the gesture stream: {}", e);
        }
        log::info!("Supervisor stopped.");
    }

    fn shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Polls one established session until shutdown or a hard fault.
    fn stream(&mut self, mut imu: BNO080<I2cBus>, detector: &mut GestureDetector) {
        let timeout = self.imu_config.poll_timeout();

        while !self.shutdown() {
            match imu.poll_frame(timeout) {
                Ok(frame) => {
                    self.metrics.frame();
                    // A failed row is logged and the stream keeps going; the
                    // output sinks never stall the session.
                    if let Err(e) = self.pose_writer.write_frame(&frame) {
                        log::error!("Dropped a pose row: {}", e);
                    }
                    detector.push_sample(frame.t, &frame.accel, &frame.quat);
                    if let Some(gesture) = detector.poll_gesture() {
                        if let Err(e) = self.gesture_writer.write_gesture(&gesture) {
                            log::error!("Dropped a gesture line: {}", e);
                        }
                    }
                }
                Err(error) => {
                    self.metrics.drop_one(&error);
                    match recovery_for(&error) {
                        Recovery::Continue => {}
                        Recovery::Reenable => {
                            log::warn!("Recovering from: {}", error);
                            if let Err(e) = imu.handle_reset() {
                                log::error!("Recovery failed ({}), re-initializing.", e);
                                return;
                            }
                        }
                        Recovery::Reinit => {
                            log::error!("Session fault: {}", error);
                            return;
                        }
                    }
                }
            }
            self.metrics.maybe_report(imu.last_error());
        }
    }

    /// # Explanation
    /// Opens the bus and bootstraps a session, doubling the retry delay from
    /// 100 ms up to 2 s while the sensor keeps failing. Returns `None` when
    /// a shutdown arrives during the wait.
    fn connect(&mut self) -> Option<BNO080<I2cBus>> {
        let mut backoff = BACKOFF_INITIAL;

        loop {
            if self.shutdown() {
                return None;
            }

            let attempt = BNO080::open(self.imu_config).and_then(|mut imu| {
                imu.enable_reports()?;
                Ok(imu)
            });
            match attempt {
                Ok(imu) => return Some(imu),
                Err(error) => {
                    log::error!(
                        "Initialization failed: {}. Retrying in {} ms.",
                        error,
                        backoff.as_millis()
                    );
                    self.metrics.drop_one(&error);
                    if !self.sleep_with_shutdown(backoff) {
                        return None;
                    }
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    /// Sleeps for the given duration in small slices; returns false as soon
    /// as the shutdown flag is observed.
    fn sleep_with_shutdown(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(BACKOFF_SLICE.min(deadline - now));
        }
    }
}

use crate::bus::{BusDevice, I2cBus};
use crate::error::ImuError;
use crate::gesture::rotate_vector;
use crate::sh2::{self, SensorId, SensorValue};
use crate::shtp::{Channel, ShtpFrame, ShtpPort};
use nalgebra::{Quaternion, Vector3};
use std::time::{Duration, Instant};

/// Nominal gravity magnitude. The game rotation vector is gravity-referenced
/// with X as the vertical world axis, so the world gravity estimate is
/// (GRAVITY, 0, 0).
const GRAVITY: f64 = 9.80665;

/// How many startup/advertisement frames the bootstrap consumes at most.
const MAX_DRAIN_ITERATIONS: usize = 32;
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(50);
const PRODUCT_ID_TIMEOUT: Duration = Duration::from_millis(500);
const RESET_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct ImuConfig {
    pub bus: u8,
    pub addr: u16,
    pub hz: u32,
    pub timeout_ms: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        ImuConfig {
            bus: 1,
            addr: 0x4A,
            hz: 100,
            timeout_ms: 1000,
        }
    }
}

impl ImuConfig {
    /// The report interval sent to the hub. The rate is clamped to the range
    /// the gyros support.
    pub fn interval_us(&self) -> u32 {
        1_000_000 / self.hz.clamp(1, 400)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One assembled observation: world-referenced orientation plus sensor-frame
/// dynamics, stamped with seconds since the session epoch.
#[derive(Debug, Clone, Copy)]
pub struct PoseFrame {
    pub t: f64,
    /// m/s², sensor frame, gravity already removed.
    pub accel: Vector3<f64>,
    /// rad/s, sensor frame.
    pub gyro: Vector3<f64>,
    /// Unit game-rotation quaternion (w, i, j, k).
    pub quat: Quaternion<f64>,
}

/// # Explanation
/// The freshness slots of the frame assembler. A slot holds a value only
/// between the report that filled it and the emission that drains it, so
/// "updated since the last emission" is exactly `is_some()`. The absolute
/// accelerometer is a fallback for phases where the hub's own linear
/// acceleration is unreliable; when both are fresh the linear one wins.
#[derive(Debug, Default)]
struct ReportSlots {
    linear: Option<Vector3<f64>>,
    absolute: Option<Vector3<f64>>,
    gyro: Option<Vector3<f64>>,
    quat: Option<Quaternion<f64>>,
}

impl ReportSlots {
    fn ready(&self) -> bool {
        (self.linear.is_some() || self.absolute.is_some())
            && self.gyro.is_some()
            && self.quat.is_some()
    }
}

/// # Explanation
/// The session manager for a BNO08x sensor hub. It exclusively owns the bus
/// handle and the outgoing sequence table, performs the bootstrap handshake,
/// enables the motion reports and assembles pose frames from the report
/// stream. Faults are reported through the crate error taxonomy; recovery
/// decisions belong to the supervisor.
pub struct BNO080<B: BusDevice> {
    port: ShtpPort<B>,
    config: ImuConfig,
    slots: ReportSlots,
    epoch: Instant,
    last_t: f64,
    pending_reset: bool,
    last_error: Option<u8>,
}

impl BNO080<I2cBus> {
    /// Opens the bus device and runs the full bootstrap.
    pub fn open(config: ImuConfig) -> Result<Self, ImuError> {
        let bus = I2cBus::open(config.bus, config.addr)?;
        let mut imu = BNO080::with_bus(bus, config);
        imu.init()?;
        Ok(imu)
    }
}

impl<B: BusDevice> BNO080<B> {
    /// Wraps an already open bus device without touching it. `init` must run
    /// before the session can stream.
    pub fn with_bus(bus: B, config: ImuConfig) -> Self {
        BNO080 {
            port: ShtpPort::new(bus),
            config,
            slots: ReportSlots::default(),
            epoch: Instant::now(),
            last_t: 0.0,
            pending_reset: false,
            last_error: None,
        }
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    /// The last non-timeout error code the hub reported on the control
    /// channel, kept for diagnostics.
    pub fn last_error(&self) -> Option<u8> {
        self.last_error
    }

    /// # Explanation
    /// The bootstrap sequence: clear all session state, soft-reset the hub,
    /// consume its advertisement burst and verify the product id. The
    /// monotonic epoch for frame timestamps starts here.
    pub fn init(&mut self) -> Result<(), ImuError> {
        self.slots = ReportSlots::default();
        self.pending_reset = false;
        self.last_error = None;
        self.port.clear_sequences();

        self.soft_reset()?;
        self.drain_startup()?;
        self.verify_product_id()?;

        self.epoch = Instant::now();
        self.last_t = 0.0;
        log::info!("Sensor hub session initialized.");
        Ok(())
    }

    /// Sends the one-octet reset command on the executable channel and gives
    /// the hub time to restart.
    fn soft_reset(&mut self) -> Result<(), ImuError> {
        self.port
            .write_frame(Channel::Executable, &[sh2::EXECUTABLE_RESET_COMMAND])?;
        std::thread::sleep(RESET_SETTLE);
        Ok(())
    }

    /// After a reset the hub unsolicitedly replays its advertisement and
    /// startup packets. They carry nothing this host needs, so they are read
    /// and dropped until the bus goes quiet.
    fn drain_startup(&mut self) -> Result<(), ImuError> {
        for _ in 0..MAX_DRAIN_ITERATIONS {
            match self.port.read_frame(DRAIN_READ_TIMEOUT)? {
                Some(frame) => log::debug!(
                    "Drained startup frame on channel {} ({} octets).",
                    frame.header.channel,
                    frame.payload.len()
                ),
                None => break,
            }
        }
        Ok(())
    }

    fn verify_product_id(&mut self) -> Result<(), ImuError> {
        self.port
            .write_frame(Channel::HubControl, &[sh2::PRODUCT_ID_REQUEST, 0])?;

        let deadline = Instant::now() + PRODUCT_ID_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(ImuError::ProductId);
            }
            match self.port.read_frame(deadline - now)? {
                Some(frame)
                    if frame.header.channel == Channel::HubControl as u8
                        && frame.payload.first() == Some(&sh2::PRODUCT_ID_RESPONSE) =>
                {
                    log::debug!("Product id verified.");
                    return Ok(());
                }
                Some(_) => continue,
                None => return Err(ImuError::ProductId),
            }
        }
    }

    /// # Explanation
    /// Asks the hub to stream the four motion reports at the configured
    /// rate. The classic accelerometer rides along as a fallback for the
    /// linear-acceleration report; the assembler prefers the latter whenever
    /// both slots are fresh.
    pub fn enable_reports(&mut self) -> Result<(), ImuError> {
        let interval_us = self.config.interval_us();
        for sensor in [
            SensorId::LinearAcceleration,
            SensorId::Accelerometer,
            SensorId::GyroscopeCalibrated,
            SensorId::GameRotationVector,
        ] {
            let command = sh2::set_feature_command(sensor, interval_us);
            self.port.write_frame(Channel::HubControl, &command)?;
        }
        log::info!(
            "Enabled motion reports at {} Hz ({} µs interval).",
            self.config.hz.clamp(1, 400),
            interval_us
        );
        Ok(())
    }

    /// # Explanation
    /// Reads frames until a complete pose frame can be assembled or the
    /// window elapses. Within one SHTP frame the reports are applied in
    /// payload order; the pose frame is emitted only when the quaternion,
    /// an acceleration and the gyro have all been refreshed since the last
    /// emission.
    pub fn poll_frame(&mut self, timeout: Duration) -> Result<PoseFrame, ImuError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.pending_reset {
                self.pending_reset = false;
                return Err(ImuError::SensorReset);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ImuError::Timeout(timeout));
            }
            let frame = match self.port.read_frame(deadline - now)? {
                Some(frame) => frame,
                None => return Err(ImuError::Timeout(timeout)),
            };

            self.handle_frame(&frame)?;

            if self.slots.ready() {
                if let Some(pose) = self.assemble() {
                    return Ok(pose);
                }
            }
        }
    }

    /// # Explanation
    /// Re-establishes streaming after the hub announced an autonomous reset.
    /// The bus handle stays open; the advertisement burst is drained and the
    /// reports are enabled again. Running it twice in a row leaves the
    /// session in the same state as running it once.
    pub fn handle_reset(&mut self) -> Result<(), ImuError> {
        log::info!("Re-enabling reports after a sensor reset.");
        self.slots = ReportSlots::default();
        self.pending_reset = false;
        self.drain_startup()?;
        self.enable_reports()?;
        Ok(())
    }

    fn handle_frame(&mut self, frame: &ShtpFrame) -> Result<(), ImuError> {
        if frame.header.continuation {
            // No enabled report spans more than one frame.
            log::debug!(
                "Ignoring continuation fragment on channel {}.",
                frame.header.channel
            );
            return Ok(());
        }

        match Channel::from_u8(frame.header.channel) {
            Some(Channel::Executable) => {
                if frame.payload.first() == Some(&sh2::EXECUTABLE_RESET_COMPLETE) {
                    log::warn!("The hub announced an autonomous reset.");
                    self.pending_reset = true;
                }
                Ok(())
            }
            Some(Channel::HubControl) => {
                self.process_control(&frame.payload);
                Ok(())
            }
            Some(Channel::SensorNormal) | Some(Channel::Wake) | Some(Channel::GyroRv) => {
                self.process_reports(&frame.payload)
            }
            Some(Channel::Command) => {
                log::trace!("Ignoring frame on the command channel.");
                Ok(())
            }
            // The hub advertises exactly six channels; anything else means
            // the transfer is out of step with the frame boundaries.
            None => Err(ImuError::Protocol(format!(
                "frame on unknown channel {}",
                frame.header.channel
            ))),
        }
    }

    fn process_control(&mut self, payload: &[u8]) {
        match payload.first() {
            Some(&sh2::COMMAND_RESPONSE) => {
                // The response status list; keep the status octet for
                // diagnostics via last_error().
                if let Some(&code) = payload.get(5) {
                    if code != 0 {
                        log::debug!("Hub reported error code 0x{:02X}.", code);
                        self.last_error = Some(code);
                    }
                }
            }
            Some(&sh2::PRODUCT_ID_RESPONSE) | None => {}
            Some(id) => log::trace!("Ignoring control report 0x{:02X}.", id),
        }
    }

    /// Walks a sensor-channel payload, which may hold several reports behind
    /// an optional base-timestamp record.
    fn process_reports(&mut self, payload: &[u8]) -> Result<(), ImuError> {
        let mut rest = sh2::strip_base_timestamp(payload);
        let mut decoded = 0usize;

        while !rest.is_empty() {
            match sh2::decode_report(rest) {
                Some((event, len)) => {
                    self.apply_event(&event);
                    decoded += 1;
                    rest = &rest[len..];
                }
                None if decoded == 0 => {
                    return Err(ImuError::Comm(format!(
                        "undecodable sensor record 0x{:02X}",
                        rest[0]
                    )));
                }
                None => {
                    log::debug!("Dropping {} trailing octets after last report.", rest.len());
                    break;
                }
            }
        }
        Ok(())
    }

    fn apply_event(&mut self, event: &sh2::SensorEvent) {
        match (event.sensor_id, event.value) {
            (SensorId::LinearAcceleration, SensorValue::Accel(a)) => self.slots.linear = Some(a),
            (SensorId::Accelerometer, SensorValue::Accel(a)) => self.slots.absolute = Some(a),
            (SensorId::GyroscopeCalibrated, SensorValue::Gyro(g)) => self.slots.gyro = Some(g),
            (SensorId::GameRotationVector, SensorValue::Quat(q)) => self.slots.quat = Some(q),
            _ => {}
        }
    }

    /// Drains the slots into a pose frame. The timestamp is strictly
    /// monotonic even when two emissions land in the same clock tick.
    fn assemble(&mut self) -> Option<PoseFrame> {
        if !self.slots.ready() {
            return None;
        }
        let quat = self.slots.quat.take()?;
        let gyro = self.slots.gyro.take()?;
        let accel = match self.slots.linear.take() {
            Some(linear) => {
                self.slots.absolute = None;
                linear
            }
            None => self.slots.absolute.take()? - gravity_in_sensor_frame(&quat),
        };

        let mut t = self.epoch.elapsed().as_secs_f64();
        if t <= self.last_t {
            t = self.last_t + 1e-6;
        }
        self.last_t = t;

        Some(PoseFrame {
            t,
            accel,
            gyro,
            quat,
        })
    }
}

/// The world gravity estimate rotated into the sensor frame, used to correct
/// the absolute accelerometer on the fallback path.
fn gravity_in_sensor_frame(quat: &Quaternion<f64>) -> Vector3<f64> {
    rotate_vector(&quat.conjugate(), &Vector3::new(GRAVITY, 0.0, 0.0))
}

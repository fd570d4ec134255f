use nalgebra::{Quaternion, Vector3};

// Report ids on the hub-control channel.
pub const SET_FEATURE_COMMAND: u8 = 0xFD;
pub const PRODUCT_ID_REQUEST: u8 = 0xF9;
pub const PRODUCT_ID_RESPONSE: u8 = 0xF8;
pub const COMMAND_RESPONSE: u8 = 0xF1;

/// Prefix of an optional 5-octet base-timestamp record on sensor channels.
pub const BASE_TIMESTAMP: u8 = 0xFB;
const BASE_TIMESTAMP_LEN: usize = 5;

// One-octet commands and responses on the executable channel.
pub const EXECUTABLE_RESET_COMMAND: u8 = 0x01;
pub const EXECUTABLE_RESET_COMPLETE: u8 = 0x01;

/// # Explanation
/// The sensor ids the hub can stream. Only the four motion reports the
/// session enables are decoded; gravity and the classifier ids are listed so
/// that their codes have one home, but their byte layouts are unverified
/// here and they decode to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorId {
    Accelerometer = 0x01,
    GyroscopeCalibrated = 0x02,
    LinearAcceleration = 0x04,
    Gravity = 0x06,
    GameRotationVector = 0x08,
    StepCounter = 0x11,
    StabilityClassifier = 0x13,
    StepDetector = 0x18,
    PersonalActivityClassifier = 0x1E,
}

impl SensorId {
    pub fn from_u8(value: u8) -> Option<SensorId> {
        match value {
            0x01 => Some(SensorId::Accelerometer),
            0x02 => Some(SensorId::GyroscopeCalibrated),
            0x04 => Some(SensorId::LinearAcceleration),
            0x06 => Some(SensorId::Gravity),
            0x08 => Some(SensorId::GameRotationVector),
            0x11 => Some(SensorId::StepCounter),
            0x13 => Some(SensorId::StabilityClassifier),
            0x18 => Some(SensorId::StepDetector),
            0x1E => Some(SensorId::PersonalActivityClassifier),
            _ => None,
        }
    }
}

/// Reported estimate quality, taken from the low two bits of the status
/// octet of every input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Unreliable,
    Low,
    Medium,
    High,
}

impl Accuracy {
    fn from_status(status: u8) -> Accuracy {
        match status & 0x03 {
            0 => Accuracy::Unreliable,
            1 => Accuracy::Low,
            2 => Accuracy::Medium,
            _ => Accuracy::High,
        }
    }
}

/// The decoded value of one input report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    /// m/s², sensor frame. Carried by the accelerometer and the
    /// linear-acceleration reports.
    Accel(Vector3<f64>),
    /// rad/s, sensor frame.
    Gyro(Vector3<f64>),
    /// Gravity-referenced orientation without absolute yaw.
    Quat(Quaternion<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub sensor_id: SensorId,
    pub accuracy: Accuracy,
    pub value: SensorValue,
}

fn i16_le(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Fixed point: a Qn value equals raw / 2^n.
fn q_to_f64(raw: i16, q: u32) -> f64 {
    raw as f64 / (1u32 << q) as f64
}

fn vector_report(bytes: &[u8], q: u32) -> Vector3<f64> {
    Vector3::new(
        q_to_f64(i16_le(bytes, 4), q),
        q_to_f64(i16_le(bytes, 6), q),
        q_to_f64(i16_le(bytes, 8), q),
    )
}

/// # Explanation
/// Decodes one input report from the start of `bytes` and returns the event
/// together with the number of octets the report occupied, so that a caller
/// can walk a payload carrying several reports back to back. Returns `None`
/// for unknown ids and undersized records.
///
/// Common layout: octet 0 report id, octet 1 report sequence, octet 2 status
/// (low two bits are the accuracy), octet 3 delay, then the little-endian
/// 16-bit components.
pub fn decode_report(bytes: &[u8]) -> Option<(SensorEvent, usize)> {
    let sensor_id = SensorId::from_u8(*bytes.first()?)?;

    let (value, len) = match sensor_id {
        SensorId::Accelerometer | SensorId::LinearAcceleration => {
            if bytes.len() < 10 {
                return None;
            }
            // Q8 accelerations in m/s².
            (SensorValue::Accel(vector_report(bytes, 8)), 10)
        }
        SensorId::GyroscopeCalibrated => {
            if bytes.len() < 10 {
                return None;
            }
            // Q9 angular rates in rad/s.
            (SensorValue::Gyro(vector_report(bytes, 9)), 10)
        }
        SensorId::GameRotationVector => {
            if bytes.len() < 12 {
                return None;
            }
            // Q14 components in wire order [i, j, k, real].
            let i = q_to_f64(i16_le(bytes, 4), 14);
            let j = q_to_f64(i16_le(bytes, 6), 14);
            let k = q_to_f64(i16_le(bytes, 8), 14);
            let w = q_to_f64(i16_le(bytes, 10), 14);
            (SensorValue::Quat(Quaternion::new(w, i, j, k)), 12)
        }
        _ => return None,
    };

    Some((
        SensorEvent {
            sensor_id,
            accuracy: Accuracy::from_status(bytes[2]),
            value,
        },
        len,
    ))
}

/// Drops the optional `[0xFB, delta(4)]` base-timestamp record that may
/// precede the first report of a sensor-channel payload. The delta is not
/// applied anywhere; report times come from the host's monotonic epoch.
pub fn strip_base_timestamp(payload: &[u8]) -> &[u8] {
    if payload.len() >= BASE_TIMESTAMP_LEN && payload[0] == BASE_TIMESTAMP {
        &payload[BASE_TIMESTAMP_LEN..]
    } else {
        payload
    }
}

/// # Explanation
/// Builds the 17-octet set-feature command that tells the hub to stream one
/// sensor. flags=0 selects a non-wakeup sensor, a zero batch interval selects
/// live streaming, and the sensor-specific configuration word stays zero for
/// every report this host enables.
pub fn set_feature_command(sensor: SensorId, interval_us: u32) -> [u8; 17] {
    let interval = interval_us.to_le_bytes();
    [
        SET_FEATURE_COMMAND,
        sensor as u8,
        0, // feature flags
        0, // change sensitivity LSB
        0, // change sensitivity MSB
        interval[0],
        interval[1],
        interval[2],
        interval[3],
        0, // batch interval, 4 octets
        0,
        0,
        0,
        0, // sensor-specific configuration, 4 octets
        0,
        0,
        0,
    ]
}

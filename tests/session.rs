mod common;

use common::{frame, AutoResponse, MockBus};
use raspberry_pi_gestures::devices::bno080::{ImuConfig, BNO080};
use raspberry_pi_gestures::error::ImuError;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(100);

/// A shortened stand-in for the advertisement burst the hub replays after a
/// reset; the session consumes it without interpreting it.
const ADVERTISEMENT: [u8; 12] = [
    0x00, 0x01, 0x04, 0x00, 0x00, 0x00, 0x00, 0x80, 0x06, 0x31, 0x2E, 0x30,
];

/// Product id response: report id, reset cause, version and build fields.
const PRODUCT_ID_RESPONSE: [u8; 16] = [
    0xF8, 0x01, 0x03, 0x02, 0x98, 0xA4, 0x98, 0x00, 0x72, 0x01, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00,
];

/// Game rotation vector report (identity quaternion) behind a base-timestamp
/// record.
const GRV_WITH_PREFIX: [u8; 17] = [
    0xFB, 0x10, 0x00, 0x00, 0x00, // base timestamp, delta ignored
    0x08, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40,
];

/// Linear acceleration (1, 2, 3) m/s² and a calibrated gyro (1, 0, 0) rad/s
/// in a single payload.
const LINEAR_AND_GYRO: [u8; 20] = [
    0x04, 0x00, 0x03, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, //
    0x02, 0x00, 0x03, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
];

fn config() -> ImuConfig {
    ImuConfig {
        bus: 1,
        addr: 0x4A,
        hz: 100,
        timeout_ms: 100,
    }
}

/// Scripts the bootstrap: the reset command triggers the advertisement
/// replay, the product id request its response.
fn scripted_bus() -> MockBus {
    let mut bus = MockBus::new();
    bus.auto.push(AutoResponse {
        channel: 1,
        report_id: 0x01,
        frames: vec![frame(0, 0, &ADVERTISEMENT)],
    });
    bus.auto.push(AutoResponse {
        channel: 2,
        report_id: 0xF9,
        frames: vec![frame(2, 0, &PRODUCT_ID_RESPONSE)],
    });
    bus
}

/// Queues sensor frames for delivery once streaming starts. The first
/// set-feature write marks that point in the bootstrap.
fn on_streaming(bus: &mut MockBus, frames: Vec<Vec<u8>>) {
    bus.auto.push(AutoResponse {
        channel: 2,
        report_id: 0xFD,
        frames,
    });
}

fn boot(bus: &mut MockBus) -> BNO080<&mut MockBus> {
    let mut imu = BNO080::with_bus(bus, config());
    imu.init().unwrap();
    imu.enable_reports().unwrap();
    imu
}

#[test]
fn test_bootstrap_writes_reset_product_id_and_features() {
    let mut bus = scripted_bus();
    let imu = boot(&mut bus);
    drop(imu);

    assert_eq!(bus.written.len(), 6);

    // Soft reset: one octet on the executable channel.
    assert_eq!(bus.written[0], vec![0x05, 0x00, 0x01, 0x00, 0x01]);

    // Product id request on hub control.
    assert_eq!(bus.written[1][2], 2);
    assert_eq!(bus.written[1][4], 0xF9);

    // Four set-feature commands, linear acceleration first, at 10 ms.
    let sensors: Vec<u8> = bus.written[2..].iter().map(|f| f[5]).collect();
    assert_eq!(sensors, vec![0x04, 0x01, 0x02, 0x08]);
    for feature in &bus.written[2..] {
        assert_eq!(feature.len(), 21);
        assert_eq!(feature[2], 2);
        assert_eq!(feature[4], 0xFD);
        assert_eq!(&feature[9..13], &10_000u32.to_le_bytes());
    }
}

#[test]
fn test_pose_frames_are_assembled_and_monotonic() {
    let mut bus = scripted_bus();
    on_streaming(
        &mut bus,
        vec![
            frame(3, 0, &GRV_WITH_PREFIX),
            frame(3, 1, &LINEAR_AND_GYRO),
            frame(3, 2, &GRV_WITH_PREFIX),
            frame(3, 3, &LINEAR_AND_GYRO),
        ],
    );
    let mut imu = boot(&mut bus);

    let first = imu.poll_frame(POLL).unwrap();
    assert!((first.accel.x - 1.0).abs() < 1e-12);
    assert!((first.accel.y - 2.0).abs() < 1e-12);
    assert!((first.accel.z - 3.0).abs() < 1e-12);
    assert!((first.gyro.x - 1.0).abs() < 1e-12);
    assert_eq!(first.quat.w, 1.0);
    assert!(first.t > 0.0);

    let second = imu.poll_frame(POLL).unwrap();
    assert!(second.t > first.t);
}

#[test]
fn test_no_frame_with_a_stale_quaternion() {
    let mut bus = scripted_bus();
    on_streaming(
        &mut bus,
        vec![
            frame(3, 0, &GRV_WITH_PREFIX),
            frame(3, 1, &LINEAR_AND_GYRO),
            // Acceleration and gyro again, but no new quaternion.
            frame(3, 2, &LINEAR_AND_GYRO),
        ],
    );
    let mut imu = boot(&mut bus);

    imu.poll_frame(POLL).unwrap();
    match imu.poll_frame(POLL) {
        Err(ImuError::Timeout(_)) => {}
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[test]
fn test_absolute_accelerometer_fallback_subtracts_gravity() {
    // Absolute accelerometer (11, 0, 0) with the identity orientation; the
    // assembler must remove the nominal gravity along world X.
    let absolute_and_gyro: [u8; 20] = [
        0x01, 0x00, 0x03, 0x00, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, //
        0x02, 0x00, 0x03, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
    ];

    let mut bus = scripted_bus();
    on_streaming(
        &mut bus,
        vec![frame(3, 0, &GRV_WITH_PREFIX), frame(3, 1, &absolute_and_gyro)],
    );
    let mut imu = boot(&mut bus);

    let pose = imu.poll_frame(POLL).unwrap();
    assert!((pose.accel.x - (11.0 - 9.80665)).abs() < 1e-9);
    assert!(pose.accel.y.abs() < 1e-9);
    assert!(pose.accel.z.abs() < 1e-9);
}

#[test]
fn test_linear_acceleration_is_preferred_over_absolute() {
    let absolute: [u8; 10] = [0x01, 0x00, 0x03, 0x00, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00];

    let mut bus = scripted_bus();
    on_streaming(
        &mut bus,
        vec![
            frame(3, 0, &absolute),
            frame(3, 1, &GRV_WITH_PREFIX),
            frame(3, 2, &LINEAR_AND_GYRO),
        ],
    );
    let mut imu = boot(&mut bus);

    let pose = imu.poll_frame(POLL).unwrap();
    assert!((pose.accel.x - 1.0).abs() < 1e-12);
    assert!((pose.accel.y - 2.0).abs() < 1e-12);
}

#[test]
fn test_announced_reset_surfaces_and_recovery_is_idempotent() {
    let mut bus = scripted_bus();
    on_streaming(&mut bus, vec![frame(1, 0, &[0x01])]); // reset-complete
    let mut imu = boot(&mut bus);

    match imu.poll_frame(POLL) {
        Err(ImuError::SensorReset) => {}
        other => panic!("expected SensorReset, got {:?}", other),
    }

    imu.handle_reset().unwrap();
    imu.handle_reset().unwrap();

    // The session streams again after recovery.
    drop(imu);
    on_streaming(
        &mut bus,
        vec![frame(3, 0, &GRV_WITH_PREFIX), frame(3, 1, &LINEAR_AND_GYRO)],
    );
    let mut imu = BNO080::with_bus(&mut bus, config());
    imu.enable_reports().unwrap();
    assert!(imu.poll_frame(POLL).is_ok());
}

#[test]
fn test_missing_product_id_fails_the_bootstrap() {
    let mut bus = MockBus::new();
    let mut imu = BNO080::with_bus(&mut bus, config());
    match imu.init() {
        Err(ImuError::ProductId) => {}
        other => panic!("expected ProductId, got {:?}", other),
    }
}

#[test]
fn test_unknown_channel_is_a_protocol_violation() {
    let mut bus = scripted_bus();
    on_streaming(&mut bus, vec![frame(9, 0, &[0x00, 0x00, 0x00, 0x00])]);
    let mut imu = boot(&mut bus);

    match imu.poll_frame(POLL) {
        Err(ImuError::Protocol(_)) => {}
        other => panic!("expected Protocol, got {:?}", other),
    }
}

#[test]
fn test_undecodable_sensor_record_is_a_comm_fault() {
    let mut bus = scripted_bus();
    on_streaming(&mut bus, vec![frame(3, 0, &[0x42; 10])]);
    let mut imu = boot(&mut bus);

    match imu.poll_frame(POLL) {
        Err(ImuError::Comm(_)) => {}
        other => panic!("expected Comm, got {:?}", other),
    }
}

#[test]
fn test_hub_error_code_is_kept_for_diagnostics() {
    let mut bus = scripted_bus();
    on_streaming(&mut bus, vec![frame(2, 0, &[0xF1, 0x00, 0x84, 0x00, 0x00, 0x05])]);
    let mut imu = boot(&mut bus);

    assert!(matches!(imu.poll_frame(POLL), Err(ImuError::Timeout(_))));
    assert_eq!(imu.last_error(), Some(0x05));
}

use crate::devices::bno080::PoseFrame;
use crate::gesture::GestureResult;
use std::io::Write;

/// # Explanation
/// Serializes pose frames as CSV rows `t,ax,ay,az,gx,gy,gz,qw,qi,qj,qk`
/// (SI units, seconds since the session start). The header row is optional
/// so that the stream can be appended to an existing capture.
pub struct PoseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PoseWriter<W> {
    pub fn new(inner: W, header: bool) -> Result<Self, csv::Error> {
        let mut writer = csv::Writer::from_writer(inner);
        if header {
            writer.write_record([
                "t", "ax", "ay", "az", "gx", "gy", "gz", "qw", "qi", "qj", "qk",
            ])?;
        }
        Ok(PoseWriter { writer })
    }

    pub fn write_frame(&mut self, frame: &PoseFrame) -> Result<(), csv::Error> {
        self.writer.write_record([
            format!("{:.6}", frame.t),
            format!("{:.6}", frame.accel.x),
            format!("{:.6}", frame.accel.y),
            format!("{:.6}", frame.accel.z),
            format!("{:.6}", frame.gyro.x),
            format!("{:.6}", frame.gyro.y),
            format!("{:.6}", frame.gyro.z),
            format!("{:.6}", frame.quat.w),
            format!("{:.6}", frame.quat.i),
            format!("{:.6}", frame.quat.j),
            format!("{:.6}", frame.quat.k),
        ])
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Writes one line per classified gesture.
pub struct GestureWriter<W: Write> {
    inner: W,
}

impl<W: Write> GestureWriter<W> {
    pub fn new(inner: W) -> Self {
        GestureWriter { inner }
    }

    pub fn write_gesture(&mut self, gesture: &GestureResult) -> std::io::Result<()> {
        writeln!(
            self.inner,
            "t={:.3} label={} axis={}{} dv_world=({:.3},{:.3},{:.3}) duration={:.3}",
            gesture.t_center,
            gesture.direction,
            gesture.axis,
            if gesture.positive { "+" } else { "-" },
            gesture.delta_v.x,
            gesture.delta_v.y,
            gesture.delta_v.z,
            gesture.duration,
        )
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{Axis, Direction};
    use nalgebra::{Quaternion, Vector3};

    #[test]
    fn test_pose_row_format() {
        let frame = PoseFrame {
            t: 1.25,
            accel: Vector3::new(0.5, -1.0, 0.0),
            gyro: Vector3::new(0.0, 0.0, 0.25),
            quat: Quaternion::new(1.0, 0.0, 0.0, 0.0),
        };

        let mut writer = PoseWriter::new(Vec::new(), true).unwrap();
        writer.write_frame(&frame).unwrap();
        writer.flush().unwrap();

        let written = writer.writer.into_inner().unwrap();
        let text = String::from_utf8(written).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("t,ax,ay,az,gx,gy,gz,qw,qi,qj,qk"));
        assert_eq!(
            lines.next(),
            Some(
                "1.250000,0.500000,-1.000000,0.000000,0.000000,0.000000,0.250000,\
                 1.000000,0.000000,0.000000,0.000000"
            )
        );
    }

    #[test]
    fn test_gesture_line_format() {
        let gesture = GestureResult {
            t_center: 0.5,
            duration: 0.8,
            delta_v: Vector3::new(0.1, -0.05, 1.662),
            baseline: Vector3::new(9.81, 0.0, 0.0),
            axis: Axis::Z,
            positive: true,
            direction: Direction::Right,
        };

        let mut writer = GestureWriter::new(Vec::new());
        writer.write_gesture(&gesture).unwrap();

        let text = String::from_utf8(writer.inner).unwrap();
        assert_eq!(
            text,
            "t=0.500 label=RIGHT axis=Z+ dv_world=(0.100,-0.050,1.662) duration=0.800\n"
        );
    }
}

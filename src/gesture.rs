use nalgebra::{Quaternion, Vector3};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Minimum magnitude of the dominant Δv component for a gesture to count.
const AXIS_THRESHOLD: f64 = 0.5;

/// The buffer keeps this many half-windows worth of history.
const BUFFER_SPAN_FACTOR: f64 = 2.5;

/// Slack for comparing sample times that were accumulated in f64.
const TIME_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct GestureConfig {
    /// Seconds of initial samples averaged into the gravity baseline.
    pub baseline_window_s: f64,
    /// Half width of the integration window around a peak.
    pub half_window_s: f64,
    /// Samples below this dynamic magnitude are left out of the integral.
    pub min_dyn_threshold: f64,
    /// A peak below this magnitude is not a gesture.
    pub min_peak_magnitude: f64,
    /// Minimum spacing between two emitted gestures.
    pub min_gesture_interval: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            baseline_window_s: 0.5,
            half_window_s: 0.4,
            min_dyn_threshold: 0.6,
            min_peak_magnitude: 2.5,
            min_gesture_interval: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn component(&self, v: &Vector3<f64>) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Forward,
    Backward,
    Right,
    Left,
}

impl Direction {
    /// # Explanation
    /// The one place that maps a world axis and sign to a label. The game
    /// rotation vector is gravity-referenced but yaw-free, so X is the
    /// vertical axis and Y/Z span a platform-defined horizontal plane.
    /// Deployments that need body-relative labels re-map on top of this.
    pub fn from_axis(axis: Axis, positive: bool) -> Direction {
        match (axis, positive) {
            (Axis::X, true) => Direction::Up,
            (Axis::X, false) => Direction::Down,
            (Axis::Y, true) => Direction::Forward,
            (Axis::Y, false) => Direction::Backward,
            (Axis::Z, true) => Direction::Right,
            (Axis::Z, false) => Direction::Left,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Right => "RIGHT",
            Direction::Left => "LEFT",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One classified gesture.
#[derive(Debug, Clone, Copy)]
pub struct GestureResult {
    /// Time of the acceleration peak, seconds since the session epoch.
    pub t_center: f64,
    /// Span of the samples that entered the integral.
    pub duration: f64,
    /// Integrated dynamic acceleration over the window, world frame (m/s).
    pub delta_v: Vector3<f64>,
    /// The gravity estimate that was subtracted, world frame.
    pub baseline: Vector3<f64>,
    pub axis: Axis,
    pub positive: bool,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    t: f64,
    a_world: Vector3<f64>,
}

/// Rotates a sensor-frame vector by the given orientation quaternion, the
/// plain quaternion sandwich q·v·q⁻¹ with no trigonometry. A slightly
/// denormalized quaternion (Q14 truncation) is handled by the true inverse;
/// the conjugate only steps in for degenerate input.
pub fn rotate_vector(q: &Quaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let p = Quaternion::new(0.0, v.x, v.y, v.z);
    let inverse = q.try_inverse().unwrap_or_else(|| q.conjugate());
    (q * p * inverse).imag()
}

/// # Explanation
/// The sliding-window direction classifier. Pose frames are pushed in as
/// they are assembled; the detector rotates the acceleration into the world
/// frame, learns a gravity baseline from the first quiet interval and then
/// watches the dynamic acceleration for peaks. Around each strong enough
/// peak it integrates the dynamic acceleration and labels the gesture by
/// the dominant component of the resulting Δv.
pub struct GestureDetector {
    config: GestureConfig,
    buffer: VecDeque<Sample>,
    baseline_start: Option<f64>,
    baseline_sum: Vector3<f64>,
    baseline_count: usize,
    baseline: Option<Vector3<f64>>,
    last_center: Option<f64>,
    pending: Option<GestureResult>,
}

impl GestureDetector {
    pub fn new(config: GestureConfig) -> Self {
        GestureDetector {
            config,
            buffer: VecDeque::new(),
            baseline_start: None,
            baseline_sum: Vector3::zeros(),
            baseline_count: 0,
            baseline: None,
            last_center: None,
            pending: None,
        }
    }

    /// The gravity estimate, once the initial window has been averaged.
    pub fn baseline(&self) -> Option<Vector3<f64>> {
        self.baseline
    }

    /// # Explanation
    /// Feeds one pose observation into the detector. `accel` is the
    /// gravity-free sensor-frame acceleration and `quat` the matching
    /// orientation; time must be monotonic.
    pub fn push_sample(&mut self, t: f64, accel: &Vector3<f64>, quat: &Quaternion<f64>) {
        let a_world = rotate_vector(quat, accel);

        self.buffer.push_back(Sample { t, a_world });
        let horizon = t - BUFFER_SPAN_FACTOR * self.config.half_window_s;
        while self.buffer.front().map_or(false, |s| s.t < horizon) {
            self.buffer.pop_front();
        }

        if self.baseline.is_none() {
            self.accumulate_baseline(t, &a_world);
            return;
        }

        self.detect(t);
    }

    /// Takes the pending gesture, if one was completed. Each call drains at
    /// most one result.
    pub fn poll_gesture(&mut self) -> Option<GestureResult> {
        self.pending.take()
    }

    fn accumulate_baseline(&mut self, t: f64, a_world: &Vector3<f64>) {
        let start = *self.baseline_start.get_or_insert(t);
        self.baseline_sum += *a_world;
        self.baseline_count += 1;

        if t - start >= self.config.baseline_window_s && self.baseline_count >= 3 {
            let baseline = self.baseline_sum / self.baseline_count as f64;
            log::info!(
                "Gravity baseline estimated from {} samples: ({:.3}, {:.3}, {:.3}) m/s².",
                self.baseline_count,
                baseline.x,
                baseline.y,
                baseline.z
            );
            self.baseline = Some(baseline);
        }
    }

    fn detect(&mut self, t_now: f64) {
        // The previous result must be drained before the next one is scored.
        if self.pending.is_some() {
            return;
        }
        let baseline = match self.baseline {
            Some(b) => b,
            None => return,
        };

        let (peak_index, peak_magnitude) = match self.find_peak(&baseline) {
            Some(peak) => peak,
            None => return,
        };
        if peak_magnitude < self.config.min_peak_magnitude {
            return;
        }
        let t_peak = self.buffer[peak_index].t;

        if let Some(last) = self.last_center {
            if t_peak - last < self.config.min_gesture_interval {
                return;
            }
        }

        // Score only once the buffer covers the peak's trailing half window,
        // otherwise every gesture would integrate a truncated Δv.
        if t_now + TIME_EPS < t_peak + self.config.half_window_s {
            return;
        }

        let lo = t_peak - self.config.half_window_s - TIME_EPS;
        let hi = t_peak + self.config.half_window_s + TIME_EPS;
        let window: Vec<&Sample> = self
            .buffer
            .iter()
            .filter(|s| s.t >= lo && s.t <= hi)
            .collect();
        if window.len() < 3 {
            return;
        }

        let mut delta_v = Vector3::zeros();
        let mut prev_t: Option<f64> = None;
        for sample in &window {
            if let Some(prev) = prev_t {
                let a_dyn = sample.a_world - baseline;
                if a_dyn.norm() >= self.config.min_dyn_threshold {
                    delta_v += a_dyn * (sample.t - prev);
                }
            }
            prev_t = Some(sample.t);
        }

        let axis = dominant_axis(&delta_v);
        let component = axis.component(&delta_v);
        if component.abs() < AXIS_THRESHOLD {
            return;
        }
        let positive = component > 0.0;
        let direction = Direction::from_axis(axis, positive);
        let duration = window[window.len() - 1].t - window[0].t;

        log::info!(
            "Gesture {} at t={:.3} s (axis {}{}, |Δv|={:.3} m/s).",
            direction,
            t_peak,
            axis,
            if positive { "+" } else { "-" },
            component.abs()
        );

        self.pending = Some(GestureResult {
            t_center: t_peak,
            duration,
            delta_v,
            baseline,
            axis,
            positive,
            direction,
        });
        self.last_center = Some(t_peak);
    }

    fn find_peak(&self, baseline: &Vector3<f64>) -> Option<(usize, f64)> {
        let mut peak: Option<(usize, f64)> = None;
        for (index, sample) in self.buffer.iter().enumerate() {
            let magnitude = (sample.a_world - *baseline).norm();
            if peak.map_or(true, |(_, best)| magnitude > best) {
                peak = Some((index, magnitude));
            }
        }
        peak
    }
}

fn dominant_axis(v: &Vector3<f64>) -> Axis {
    let (ax, ay, az) = (v.x.abs(), v.y.abs(), v.z.abs());
    if ax >= ay && ax >= az {
        Axis::X
    } else if ay >= az {
        Axis::Y
    } else {
        Axis::Z
    }
}
